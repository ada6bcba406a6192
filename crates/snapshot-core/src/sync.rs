//! Outcome bookkeeping for snapshot runs.
//!
//! Pure types: how one endpoint ended up, per-worker counters, and the
//! summary handed to the failure sink once every worker has joined.

use std::fmt;

use crate::endpoints::Endpoint;

/// Where an endpoint's processing gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    /// The session could not be created. Never retried.
    Init,
    /// Both the selective and the full-resync attempt failed.
    Harvest,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureStage::Init => f.write_str("init"),
            FailureStage::Harvest => f.write_str("harvest"),
        }
    }
}

/// Outcome of processing a single endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Selective attempt succeeded
    Harvested,
    /// Selective attempt failed, full resync succeeded
    Recovered,
    /// Selective attempt found nothing new
    AlreadySynced,
    /// Endpoint is recorded as a failure
    Failed(FailureStage),
}

impl JobOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, JobOutcome::Failed(_))
    }
}

/// Statistics for a snapshot run, or for one worker's share of it.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SnapshotStats {
    pub harvested: usize,
    pub recovered: usize,
    pub already_synced: usize,
    pub failed: usize,
}

impl SnapshotStats {
    /// Creates a new empty stats tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an outcome, incrementing the appropriate counter.
    pub fn record(&mut self, outcome: JobOutcome) {
        match outcome {
            JobOutcome::Harvested => self.harvested += 1,
            JobOutcome::Recovered => self.recovered += 1,
            JobOutcome::AlreadySynced => self.already_synced += 1,
            JobOutcome::Failed(_) => self.failed += 1,
        }
    }

    /// Adds another tracker's counters into this one.
    pub fn merge(&mut self, other: &SnapshotStats) {
        self.harvested += other.harvested;
        self.recovered += other.recovered;
        self.already_synced += other.already_synced;
        self.failed += other.failed;
    }

    /// Returns the total number of processed endpoints.
    pub fn total(&self) -> usize {
        self.successful() + self.failed
    }

    /// Returns the number of endpoints that did not end up as failures.
    pub fn successful(&self) -> usize {
        self.harvested + self.recovered + self.already_synced
    }
}

/// Result of a complete run, available after the join barrier.
#[derive(Debug, Clone, Default)]
pub struct SnapshotSummary {
    pub stats: SnapshotStats,
    /// Endpoints that exhausted their retries, in no particular order.
    pub failed: Vec<Endpoint>,
}

impl SnapshotSummary {
    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}
