//! oai-snapshot CLI - harvest a batch of OAI-PMH endpoints in one go
//!
//! This crate ties the endpoint source, the worker pool, the HTTP session
//! factory and the failure sink together.

pub mod config;

use std::io::Write;

use anyhow::Context;
use snapshot_client::OaiSessionFactory;
use snapshot_core::{AppError, EndpointSource, FailureSink, SinkReport, Snapshot};

pub use config::Config;

/// Runs one snapshot end to end.
///
/// Failed endpoints go to a new file in [`Config::failed_dir`]; if that file
/// cannot be created they are written to `stdout` and the returned report is
/// [`SinkReport::Fallback`].
///
/// # Errors
///
/// Fails before any work starts if the endpoint list cannot be read or the
/// HTTP client cannot be built.
pub async fn run<W: Write>(config: &Config, stdout: &mut W) -> anyhow::Result<SinkReport> {
    let endpoints = EndpointSource::default()
        .with_file(config.file.clone())
        .shuffled(config.shuffle)
        .load()
        .context("Failed to load endpoint list")?;

    let factory = OaiSessionFactory::new(config.base_dir(), &config.http_config())
        .context("Failed to build HTTP client")?;

    let summary = Snapshot::new(factory, config.snapshot_config())
        .run(endpoints)
        .await;

    let report = FailureSink::new(config.failed_dir())
        .persist(&summary.failed, stdout)
        .context("Failed to write failed endpoints")?;

    Ok(report)
}

/// Renders a fatal error for the terminal.
///
/// Uses [`AppError::user_message`] when an `AppError` sits anywhere in the
/// chain, keeping the outermost context as a prefix.
pub fn describe_error(err: &anyhow::Error) -> String {
    match err.chain().find_map(|e| e.downcast_ref::<AppError>()) {
        Some(app) => format!("{}: {}", err, app.user_message()),
        None => format!("{:#}", err),
    }
}
