//! Error types for the insight-build crate.

use std::path::PathBuf;

use thiserror::Error;

use insight_core::{ConstructionReport, SchemaViolation};
use insight_graph::StoreError;

/// Fatal construction failures. Row-level problems never surface here; they
/// are recorded in the report.
#[derive(Error, Debug)]
pub enum ConstructionError {
    /// The store became unreachable. The report covers everything committed
    /// before that and is marked `incomplete`.
    #[error(
        "Graph store unreachable after {} committed batch(es): {source}",
        .report.batches_committed
    )]
    Connectivity {
        report: Box<ConstructionReport>,
        source: StoreError,
    },

    /// The store refused to clear the graph or declare a constraint, so no
    /// row was written.
    #[error("Could not prepare the graph store: {source}")]
    Preparation {
        report: Box<ConstructionReport>,
        source: StoreError,
    },

    /// The mapping reads tables or columns the input does not have.
    #[error("Mapping does not match the source tables: {}", describe(.0))]
    InvalidSources(Vec<SchemaViolation>),
}

impl ConstructionError {
    /// The partial report, when the run got far enough to produce one.
    pub fn report(&self) -> Option<&ConstructionReport> {
        match self {
            Self::Connectivity { report, .. } | Self::Preparation { report, .. } => Some(report),
            Self::InvalidSources(_) => None,
        }
    }
}

fn describe(violations: &[SchemaViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors loading tabular input.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("CSV error in {path}: {source}")]
    Csv {
        path: PathBuf,
        source: csv::Error,
    },

    #[error("{path} has no header row")]
    MissingHeader { path: PathBuf },

    #[error("{path} has duplicate column '{column}' after header normalization")]
    DuplicateColumn { path: PathBuf, column: String },

    #[error("Table '{table}' is loaded more than once")]
    DuplicateTable { table: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConstructionError>;
