//! Outcome of one graph construction run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a construction run ended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every batch was attempted.
    Completed,
    /// Stopped at a batch boundary on request; committed batches remain.
    Cancelled,
    /// The store became unreachable mid-run.
    Incomplete,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Incomplete => "incomplete",
        };
        f.write_str(s)
    }
}

/// A single row that could not be written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RowError {
    /// Zero-based index of the row in its source table.
    pub row_index: usize,
    /// Entity or relationship type being written.
    pub source: String,
    pub reason: String,
}

/// Counters and row errors for one construction run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConstructionReport {
    pub run_id: Uuid,
    pub model_fingerprint: String,
    pub status: RunStatus,
    pub nodes_created: u64,
    pub nodes_merged: u64,
    pub relationships_created: u64,
    pub relationships_merged: u64,
    pub batches_committed: u64,
    pub errors: Vec<RowError>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ConstructionReport {
    /// Start a report for a run over the model with this fingerprint.
    pub fn begin(model_fingerprint: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            model_fingerprint: model_fingerprint.into(),
            status: RunStatus::Completed,
            nodes_created: 0,
            nodes_merged: 0,
            relationships_created: 0,
            relationships_merged: 0,
            batches_committed: 0,
            errors: Vec::new(),
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn record_row_error(
        &mut self,
        row_index: usize,
        source: impl Into<String>,
        reason: impl Into<String>,
    ) {
        self.errors.push(RowError {
            row_index,
            source: source.into(),
            reason: reason.into(),
        });
    }

    /// Fold the counters and errors of a partial report into this one.
    ///
    /// Used when entity types are written concurrently into separate reports.
    pub fn merge(&mut self, other: ConstructionReport) {
        self.nodes_created += other.nodes_created;
        self.nodes_merged += other.nodes_merged;
        self.relationships_created += other.relationships_created;
        self.relationships_merged += other.relationships_merged;
        self.batches_committed += other.batches_committed;
        self.errors.extend(other.errors);
    }

    /// Stamp the final status and completion time.
    pub fn finish(mut self, status: RunStatus) -> Self {
        self.status = status;
        self.completed_at = Some(Utc::now());
        self
    }

    pub fn total_nodes(&self) -> u64 {
        self.nodes_created + self.nodes_merged
    }

    pub fn total_relationships(&self) -> u64 {
        self.relationships_created + self.relationships_merged
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}
