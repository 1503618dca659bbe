//! insight-graph: mutation handle for the knowledge graph.
//!
//! The construction executor only talks to a [`GraphMutator`]. This crate
//! provides the two implementations: [`GraphClient`] for Neo4j and
//! [`MemoryGraph`], an in-process store used for dry runs and tests.

pub mod client;
pub mod memory;
pub mod mutations;
pub mod mutator;
pub mod queries;

pub use client::{GraphClient, GraphConfig, GraphError};
pub use memory::MemoryGraph;
pub use mutator::{GraphMutator, MergeOutcome, MutationBatch, NodeRef, Properties, StoreError};
pub use queries::GraphStatistics;
