//! Harvest session abstraction.
//!
//! The worker pool never talks to a provider directly. It asks a
//! [`SessionFactory`] for a fresh [`HarvestSession`] per endpoint, adjusts the
//! session's [`SessionOptions`] and calls [`HarvestSession::run`]. The HTTP
//! implementation lives in `snapshot-client`; tests use scripted in-memory
//! factories.

use std::fmt;

use async_trait::async_trait;

use crate::endpoints::Endpoint;
use crate::error::AppError;

/// Default metadata prefix requested from providers.
pub const DEFAULT_FORMAT: &str = "oai_dc";

/// Default upper bound on resumption-token loops for one session.
pub const DEFAULT_MAX_REQUESTS: usize = 1_048_576;

/// Whether a session may use stored state to fetch only new records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarvestMode {
    /// Incremental sync from the last harvest date.
    Selective,
    /// Full resync of the complete record set.
    Full,
}

impl HarvestMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            HarvestMode::Selective => "selective",
            HarvestMode::Full => "full",
        }
    }
}

impl fmt::Display for HarvestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Knobs the worker pool sets on every session before running it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Iteration cap for the paginated request loop.
    pub max_requests: usize,
    /// Strip characters that are illegal in XML before looking at a response.
    pub clean_before_decode: bool,
    /// Metadata prefix, e.g. `oai_dc`.
    pub format: String,
    pub mode: HarvestMode,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_MAX_REQUESTS,
            clean_before_decode: true,
            format: DEFAULT_FORMAT.to_string(),
            mode: HarvestMode::Selective,
        }
    }
}

/// One short-lived harvest of a single endpoint.
///
/// Sessions are owned by exactly one worker and are never reused across
/// endpoints. A selective run with nothing new to fetch returns
/// [`AppError::AlreadySynced`].
#[async_trait]
pub trait HarvestSession: Send {
    fn options_mut(&mut self) -> &mut SessionOptions;

    async fn run(&mut self) -> Result<(), AppError>;
}

/// Creates sessions for endpoints. Shared by all workers.
#[async_trait]
pub trait SessionFactory: Send + Sync + 'static {
    type Session: HarvestSession + 'static;

    async fn create(&self, endpoint: &Endpoint) -> Result<Self::Session, AppError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_options_defaults() {
        let options = SessionOptions::default();
        assert_eq!(options.max_requests, 1_048_576);
        assert!(options.clean_before_decode);
        assert_eq!(options.format, "oai_dc");
        assert_eq!(options.mode, HarvestMode::Selective);
    }

    #[test]
    fn test_harvest_mode_display() {
        assert_eq!(HarvestMode::Selective.to_string(), "selective");
        assert_eq!(HarvestMode::Full.to_string(), "full");
    }
}
