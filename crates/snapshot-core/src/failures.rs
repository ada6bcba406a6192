//! Failure aggregation and persistence.
//!
//! Workers push endpoints that exhausted their retries into a shared
//! [`FailureAggregator`]. Once every worker has joined, a [`FailureSink`]
//! writes them to a uniquely named file, one identifier per line, or dumps
//! them to a fallback writer when the file cannot be created.

use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::endpoints::Endpoint;
use crate::error::AppError;

/// Default file name prefix for failure artifacts.
pub const DEFAULT_ARTIFACT_PREFIX: &str = "oai-snapshot-";

/// Mutex-guarded collection of failed endpoints, shared by all workers.
///
/// Cloning yields another handle to the same collection.
#[derive(Debug, Clone, Default)]
pub struct FailureAggregator {
    inner: Arc<Mutex<Vec<Endpoint>>>,
}

impl FailureAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one failed endpoint. Safe to call from any worker at any time.
    pub fn record(&self, endpoint: Endpoint) {
        self.lock().push(endpoint);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copies the failures recorded so far.
    pub fn snapshot(&self) -> Vec<Endpoint> {
        self.lock().clone()
    }

    // Only push/clone happen under the lock, so poisoned data is still whole.
    fn lock(&self) -> MutexGuard<'_, Vec<Endpoint>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// How the failures were persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkReport {
    /// Failures were written to this file.
    Written(PathBuf),
    /// The artifact could not be created; failures went to the fallback writer.
    Fallback,
}

impl SinkReport {
    /// Process exit status for this outcome.
    pub fn exit_code(&self) -> u8 {
        match self {
            SinkReport::Written(_) => 0,
            SinkReport::Fallback => 1,
        }
    }
}

/// Writes aggregated failures to a uniquely named artifact.
#[derive(Debug, Clone)]
pub struct FailureSink {
    dir: PathBuf,
    prefix: String,
}

impl Default for FailureSink {
    fn default() -> Self {
        Self::new(std::env::temp_dir())
    }
}

impl FailureSink {
    /// Creates a sink that places artifacts in `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            prefix: DEFAULT_ARTIFACT_PREFIX.to_string(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Persists `failures`, one identifier per line.
    ///
    /// The artifact is created even when `failures` is empty. If it cannot be
    /// created or written, every identifier is written to `fallback` instead
    /// and [`SinkReport::Fallback`] is returned.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` only if writing to `fallback` fails as well.
    pub fn persist<W: Write>(
        &self,
        failures: &[Endpoint],
        fallback: &mut W,
    ) -> Result<SinkReport, AppError> {
        match self.write_artifact(failures) {
            Ok(path) => {
                tracing::info!(
                    path = %path.display(),
                    count = failures.len(),
                    "Wrote failed endpoints"
                );
                Ok(SinkReport::Written(path))
            }
            Err(e) => {
                tracing::error!(
                    dir = %self.dir.display(),
                    error = %e,
                    "Cannot create failure artifact, writing failed endpoints to fallback output"
                );
                for endpoint in failures {
                    writeln!(fallback, "{}", endpoint)?;
                }
                fallback.flush()?;
                Ok(SinkReport::Fallback)
            }
        }
    }

    fn write_artifact(&self, failures: &[Endpoint]) -> Result<PathBuf, AppError> {
        let file = tempfile::Builder::new()
            .prefix(&self.prefix)
            .tempfile_in(&self.dir)?;

        {
            let mut writer = BufWriter::new(file.as_file());
            for endpoint in failures {
                writeln!(writer, "{}", endpoint)?;
            }
            writer.flush()?;
        }

        let (_, path) = file.keep().map_err(|e| e.error)?;
        Ok(path)
    }
}
