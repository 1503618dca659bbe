//! The graph-mutation handle consumed by the construction executor.
//!
//! Writes go through a [`MutationBatch`]: everything merged into one batch is
//! committed or rolled back together. Every merge is an upsert, so replaying
//! a batch against the same store is harmless.

use std::collections::BTreeMap;

use async_trait::async_trait;
use insight_core::Value;

use crate::queries::GraphStatistics;

/// Property map written onto a node or relationship.
pub type Properties = BTreeMap<String, Value>;

/// Result of a single merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Nothing matched the merge key; a new element was written.
    Created,
    /// An existing element was updated.
    Merged,
    /// A relationship endpoint does not exist; nothing was written.
    MissingEndpoint,
}

/// Errors from a graph store.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    /// The store cannot be reached. Construction stops.
    #[error("Graph store unavailable: {0}")]
    Unavailable(String),

    /// The store refused a statement. Only the current batch is affected.
    #[error("Graph store rejected the write: {0}")]
    Rejected(String),
}

impl StoreError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// A node addressed by label and identifier property.
#[derive(Debug, Clone, Copy)]
pub struct NodeRef<'a> {
    pub label: &'a str,
    pub id_property: &'a str,
    pub id: &'a Value,
}

impl<'a> NodeRef<'a> {
    pub fn new(label: &'a str, id_property: &'a str, id: &'a Value) -> Self {
        Self {
            label,
            id_property,
            id,
        }
    }
}

/// A handle capable of executing graph-mutation statements.
#[async_trait]
pub trait GraphMutator: Send + Sync {
    /// Ensure `property` is unique among nodes labelled `label`. Idempotent.
    async fn declare_unique_constraint(&self, label: &str, property: &str)
        -> Result<(), StoreError>;

    /// Open a new write batch.
    async fn begin_batch(&self) -> Result<Box<dyn MutationBatch>, StoreError>;

    /// Remove every node and relationship.
    async fn clear(&self) -> Result<u64, StoreError>;

    /// Node and relationship counts for the whole store.
    async fn statistics(&self) -> Result<GraphStatistics, StoreError>;
}

/// One atomic unit of writes.
#[async_trait]
pub trait MutationBatch: Send {
    /// Upsert the node keyed by (`label`, `id_property` = `id`), overwriting
    /// the given attributes.
    async fn merge_node(
        &mut self,
        label: &str,
        id_property: &str,
        id: &Value,
        attributes: &Properties,
    ) -> Result<MergeOutcome, StoreError>;

    /// Upsert the directed relationship `source -[rel_type]-> target`,
    /// overwriting its attributes. Both endpoints must already exist.
    async fn merge_relationship(
        &mut self,
        rel_type: &str,
        source: NodeRef<'_>,
        target: NodeRef<'_>,
        attributes: &Properties,
    ) -> Result<MergeOutcome, StoreError>;

    async fn commit(&mut self) -> Result<(), StoreError>;

    async fn rollback(&mut self) -> Result<(), StoreError>;
}
