//! insight-infer: from raw tables to a proposed graph mapping.
//!
//! Three pure, synchronous stages:
//! - [`profiler`] computes a statistical profile per column
//! - [`classifier`] assigns one role per column using ordered [`rules`]
//! - [`inference`] turns roles into entity and relationship types
//!
//! Name matching throughout is driven by [`NamingPolicy`].

pub mod classifier;
pub mod config;
pub mod inference;
pub mod naming;
pub mod profiler;
pub mod rules;

pub use classifier::{
    Classification, ColumnAssignment, IdentifierRegistry, KeyValues, RoleClassifier, TableRoles,
};
pub use config::{NamingPolicy, ProfileConfig, RoleConfig};
pub use inference::{infer_schema, InferenceOutcome, SchemaInference, UnmappedTable, UnresolvedKey};
pub use profiler::{ColumnProfiler, TableProfile};
pub use rules::{default_rules, RoleRule, RuleContext};
