use clap::Parser;
use std::path::PathBuf;

use snapshot_core::session::{DEFAULT_FORMAT, DEFAULT_MAX_REQUESTS};
use snapshot_core::{HttpConfig, SessionOptions, SnapshotConfig, DEFAULT_WORKERS};

/// CLI configuration parsed from command line arguments and environment variables
#[derive(Parser, Debug)]
#[command(name = "oai-snapshot")]
#[command(
    author,
    version,
    about = "Harvest many OAI-PMH endpoints concurrently and record the ones that fail"
)]
#[command(after_help = "Examples:
  oai-snapshot                          # Harvest the built-in endpoint list
  oai-snapshot -f endpoints.txt -S      # Harvest endpoints from a file, shuffled
  oai-snapshot -f failed.txt -w 8       # Retry a previous run's failures with 8 workers
  oai-snapshot --format marcxml -q")]
pub struct Config {
    /// File with one endpoint per line (defaults to the built-in list)
    #[arg(short = 'f', long = "file", value_name = "PATH", env = "SNAPSHOT_ENDPOINTS")]
    pub file: Option<PathBuf>,

    /// Base directory for harvested files
    #[arg(long, value_name = "PATH", env = "SNAPSHOT_BASE_DIR")]
    pub base_dir: Option<PathBuf>,

    /// Metadata format
    #[arg(long, default_value = DEFAULT_FORMAT, env = "SNAPSHOT_FORMAT")]
    pub format: String,

    /// Maximum number of resumption token loops per endpoint
    #[arg(long = "max", default_value_t = DEFAULT_MAX_REQUESTS, env = "SNAPSHOT_MAX_REQUESTS")]
    pub max_requests: usize,

    /// Number of concurrent workers
    #[arg(short, long, default_value_t = DEFAULT_WORKERS, env = "SNAPSHOT_WORKERS")]
    pub workers: usize,

    /// Suppress all log output
    #[arg(short, long)]
    pub quiet: bool,

    /// Shuffle endpoints before harvesting
    #[arg(short = 'S', long)]
    pub shuffle: bool,

    /// Directory for the failed-endpoints file (defaults to the system temp dir)
    #[arg(long, value_name = "PATH", env = "SNAPSHOT_FAILED_DIR")]
    pub failed_dir: Option<PathBuf>,
}

impl Config {
    /// Base directory, falling back to the user cache directory.
    pub fn base_dir(&self) -> PathBuf {
        self.base_dir
            .clone()
            .unwrap_or_else(snapshot_core::default_base_dir)
    }

    /// Directory the failure artifact is written to.
    pub fn failed_dir(&self) -> PathBuf {
        self.failed_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub fn snapshot_config(&self) -> SnapshotConfig {
        SnapshotConfig {
            workers: self.workers,
            session: SessionOptions {
                max_requests: self.max_requests,
                format: self.format.clone(),
                ..SessionOptions::default()
            },
        }
    }

    pub fn http_config(&self) -> HttpConfig {
        HttpConfig::default()
    }
}
