//! insight-build: turns a validated mapping plus tables into graph mutations.
//!
//! The executor writes through any [`insight_graph::GraphMutator`]: constraints
//! first, then entity nodes, then (after every entity type has finished)
//! relationships. Tables come from CSV files via [`source`] or are built in
//! memory.

pub mod config;
pub mod error;
pub mod executor;
pub mod source;

pub use config::BuildConfig;
pub use error::{ConstructionError, SourceError};
pub use executor::{BuildOutcome, CancellationHandle, ConstructionExecutor};
pub use source::{load_csv, load_tables};
