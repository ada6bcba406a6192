//! oai-snapshot client - HTTP harvest sessions for OAI-PMH providers
//!
//! This crate provides the concrete collaborator the worker pool drives:
//!
//! - [`oai`] - an OAI-PMH `ListRecords` session and its factory
//! - [`xml`] - resumption-token and error-element inspection
//!
//! # Overview
//!
//! Sessions page through `ListRecords` with resumption tokens, write each
//! response verbatim below a base directory, and remember the date of the
//! last successful harvest so the next selective run only asks for newer
//! records.

pub mod oai;
pub mod xml;

pub use oai::{OaiSession, OaiSessionFactory};
