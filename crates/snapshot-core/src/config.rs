//! Configuration types for oai-snapshot components.
//!
//! Every value has a hardcoded default here; the CLI overrides them from
//! flags and environment variables.

use std::path::PathBuf;
use std::time::Duration;

use crate::session::SessionOptions;

/// Default number of concurrent workers.
///
/// High enough to keep a large endpoint list moving, low enough that one host
/// does not open hundreds of connections. No per-provider rate limiting
/// happens at this layer.
pub const DEFAULT_WORKERS: usize = 64;

/// HTTP client configuration for provider requests.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_base_delay: Duration::from_millis(500),
        }
    }
}

/// Snapshot run configuration.
#[derive(Debug, Clone)]
pub struct SnapshotConfig {
    /// Number of worker tasks. Values below 1 are treated as 1.
    pub workers: usize,
    /// Template applied to every session before its first attempt.
    pub session: SessionOptions,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            session: SessionOptions::default(),
        }
    }
}

impl SnapshotConfig {
    /// Worker count actually spawned.
    pub fn effective_workers(&self) -> usize {
        self.workers.max(1)
    }
}

/// Default directory for harvested pages and per-endpoint state.
///
/// Falls back to the system temp directory when no cache dir is known.
pub fn default_base_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("oai-snapshot")
}
