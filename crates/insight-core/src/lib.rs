//! insight-core: Shared data model for the Insight Graph engine.
//!
//! This crate provides the foundational types used across all Insight components:
//! - Tagged scalar values and the tabular row source (`Table`)
//! - Column profiles and column roles produced by inference
//! - The editable graph mapping model (entities, relationships) and its validation
//! - The construction report returned by a graph build
//! - Configuration loading and common error types

pub mod config;
pub mod error;
pub mod mapping;
pub mod report;
pub mod types;
pub mod value;

pub use error::InsightError;
pub use mapping::{GraphMappingModel, SchemaViolation, ValidatedModel};
pub use report::{ConstructionReport, RowError, RunStatus};
pub use types::{
    AnomalyKind, ColumnProfile, ColumnRole, ColumnType, EntityType, ProfilingAnomaly,
    RelationshipType,
};
pub use value::{Row, Table, Value, ValueKey};
