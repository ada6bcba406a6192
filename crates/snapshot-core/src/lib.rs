//! oai-snapshot core - endpoint sourcing, worker pool, and failure aggregation.

pub mod config;
pub mod endpoints;
pub mod error;
pub mod failures;
pub mod harvest;
pub mod session;
pub mod sync;

pub use config::{default_base_dir, HttpConfig, SnapshotConfig, DEFAULT_WORKERS};
pub use endpoints::{Endpoint, EndpointSource, DEFAULT_ENDPOINTS};
pub use error::AppError;
pub use failures::{FailureAggregator, FailureSink, SinkReport};
pub use harvest::{RetryState, Snapshot};
pub use session::{HarvestMode, HarvestSession, SessionFactory, SessionOptions};
pub use sync::{FailureStage, JobOutcome, SnapshotStats, SnapshotSummary};
