//! In-process graph store.
//!
//! Behaves like the Neo4j client for everything the executor relies on:
//! merge-on-key upserts, batches that commit atomically, missing-endpoint
//! detection and uniqueness constraints. Used by `insight build --dry-run` and
//! by tests, which can make it reject specific identifier values or drop
//! offline after a number of commits.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use insight_core::{Value, ValueKey};

use crate::mutator::{GraphMutator, MergeOutcome, MutationBatch, NodeRef, Properties, StoreError};
use crate::queries::GraphStatistics;

type NodeKey = (String, ValueKey);
type EdgeKey = (String, NodeKey, NodeKey);

#[derive(Debug, Default)]
struct MemoryState {
    constraints: BTreeSet<(String, String)>,
    nodes: BTreeMap<NodeKey, Properties>,
    edges: BTreeMap<EdgeKey, Properties>,
    commits: u64,
    offline: bool,
    offline_after_commits: Option<u64>,
    rejected_values: HashSet<ValueKey>,
}

impl MemoryState {
    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline {
            Err(StoreError::Unavailable("in-memory graph is offline".to_string()))
        } else {
            Ok(())
        }
    }

    fn check_accepted(&self, key: &ValueKey) -> Result<(), StoreError> {
        if self.rejected_values.contains(key) {
            Err(StoreError::Rejected(format!("value {key:?} rejected by store")))
        } else {
            Ok(())
        }
    }
}

/// A shareable in-memory graph. Clone is cheap (inner Arc).
#[derive(Debug, Clone, Default)]
pub struct MemoryGraph {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        // A panic while holding the lock leaves the maps consistent; keep going.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ── Failure Injection ────────────────────────────────────────

    /// Reject any merge whose identifier or endpoint equals `value`.
    pub fn reject_value(&self, value: impl Into<Value>) {
        if let Some(key) = value.into().key() {
            self.lock().rejected_values.insert(key);
        }
    }

    /// Make every subsequent call fail as unreachable (or recover).
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Go offline once `commits` batches have been committed.
    pub fn go_offline_after(&self, commits: u64) {
        self.lock().offline_after_commits = Some(commits);
    }

    // ── Inspection ───────────────────────────────────────────────

    pub fn node_count(&self) -> usize {
        self.lock().nodes.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.lock().edges.len()
    }

    pub fn committed_batches(&self) -> u64 {
        self.lock().commits
    }

    /// Properties of the node with this label and identifier value.
    pub fn node(&self, label: &str, id: &Value) -> Option<Properties> {
        let key = id.key()?;
        self.lock().nodes.get(&(label.to_string(), key)).cloned()
    }

    /// Properties of the relationship between two nodes.
    pub fn relationship(
        &self,
        rel_type: &str,
        source: (&str, &Value),
        target: (&str, &Value),
    ) -> Option<Properties> {
        let key = (
            rel_type.to_string(),
            (source.0.to_string(), source.1.key()?),
            (target.0.to_string(), target.1.key()?),
        );
        self.lock().edges.get(&key).cloned()
    }

    pub fn has_constraint(&self, label: &str, property: &str) -> bool {
        self.lock()
            .constraints
            .contains(&(label.to_string(), property.to_string()))
    }
}

#[async_trait]
impl GraphMutator for MemoryGraph {
    async fn declare_unique_constraint(
        &self,
        label: &str,
        property: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.check_online()?;
        state
            .constraints
            .insert((label.to_string(), property.to_string()));
        Ok(())
    }

    async fn begin_batch(&self) -> Result<Box<dyn MutationBatch>, StoreError> {
        self.lock().check_online()?;
        Ok(Box::new(MemoryBatch {
            graph: self.clone(),
            nodes: BTreeMap::new(),
            edges: BTreeMap::new(),
        }))
    }

    async fn clear(&self) -> Result<u64, StoreError> {
        let mut state = self.lock();
        state.check_online()?;
        let deleted = state.nodes.len() as u64;
        state.nodes.clear();
        state.edges.clear();
        Ok(deleted)
    }

    async fn statistics(&self) -> Result<GraphStatistics, StoreError> {
        let state = self.lock();
        state.check_online()?;

        let mut stats = GraphStatistics {
            node_count: state.nodes.len() as u64,
            relationship_count: state.edges.len() as u64,
            ..Default::default()
        };
        for (label, _) in state.nodes.keys() {
            *stats.label_counts.entry(label.clone()).or_default() += 1;
        }
        for (rel_type, _, _) in state.edges.keys() {
            *stats
                .relationship_type_counts
                .entry(rel_type.clone())
                .or_default() += 1;
        }
        Ok(stats)
    }
}

/// Pending writes, applied to the shared state only on commit.
struct MemoryBatch {
    graph: MemoryGraph,
    nodes: BTreeMap<NodeKey, Properties>,
    edges: BTreeMap<EdgeKey, Properties>,
}

fn node_key(label: &str, id: &Value) -> Result<NodeKey, StoreError> {
    id.key()
        .map(|key| (label.to_string(), key))
        .ok_or_else(|| StoreError::Rejected(format!("null merge key for {label}")))
}

#[async_trait]
impl MutationBatch for MemoryBatch {
    async fn merge_node(
        &mut self,
        label: &str,
        id_property: &str,
        id: &Value,
        attributes: &Properties,
    ) -> Result<MergeOutcome, StoreError> {
        let key = node_key(label, id)?;
        let existed = {
            let state = self.graph.lock();
            state.check_online()?;
            state.check_accepted(&key.1)?;
            state.nodes.contains_key(&key)
        };

        let pending = self.nodes.entry(key).or_default();
        let outcome = if existed || !pending.is_empty() {
            MergeOutcome::Merged
        } else {
            MergeOutcome::Created
        };
        pending.insert(id_property.to_string(), id.clone());
        pending.extend(attributes.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(outcome)
    }

    async fn merge_relationship(
        &mut self,
        rel_type: &str,
        source: NodeRef<'_>,
        target: NodeRef<'_>,
        attributes: &Properties,
    ) -> Result<MergeOutcome, StoreError> {
        let source_key = node_key(source.label, source.id)?;
        let target_key = node_key(target.label, target.id)?;
        let key = (rel_type.to_string(), source_key, target_key);

        let (endpoints_exist, existed) = {
            let state = self.graph.lock();
            state.check_online()?;
            state.check_accepted(&key.1 .1)?;
            state.check_accepted(&key.2 .1)?;
            let exists = |k: &NodeKey| state.nodes.contains_key(k) || self.nodes.contains_key(k);
            (
                exists(&key.1) && exists(&key.2),
                state.edges.contains_key(&key),
            )
        };
        if !endpoints_exist {
            return Ok(MergeOutcome::MissingEndpoint);
        }

        let outcome = if existed || self.edges.contains_key(&key) {
            MergeOutcome::Merged
        } else {
            MergeOutcome::Created
        };
        self.edges
            .entry(key)
            .or_default()
            .extend(attributes.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(outcome)
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let mut state = self.graph.lock();
        state.check_online()?;

        for (key, props) in std::mem::take(&mut self.nodes) {
            state.nodes.entry(key).or_default().extend(props);
        }
        for (key, props) in std::mem::take(&mut self.edges) {
            state.edges.entry(key).or_default().extend(props);
        }
        state.commits += 1;
        if state.offline_after_commits == Some(state.commits) {
            state.offline = true;
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        self.nodes.clear();
        self.edges.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, Value)]) -> Properties {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn merge_node_is_an_upsert() {
        let graph = MemoryGraph::new();
        let id = Value::Int(1);

        let mut batch = graph.begin_batch().await.unwrap();
        let first = batch
            .merge_node("Customer", "id", &id, &props(&[("name", "Ada".into())]))
            .await
            .unwrap();
        batch.commit().await.unwrap();

        let mut batch = graph.begin_batch().await.unwrap();
        let second = batch
            .merge_node("Customer", "id", &id, &props(&[("name", "Grace".into())]))
            .await
            .unwrap();
        batch.commit().await.unwrap();

        assert_eq!(first, MergeOutcome::Created);
        assert_eq!(second, MergeOutcome::Merged);
        assert_eq!(graph.node_count(), 1);
        let node = graph.node("Customer", &id).unwrap();
        assert_eq!(node["name"], Value::from("Grace"));
        assert_eq!(node["id"], id);
    }

    #[tokio::test]
    async fn relationship_needs_both_endpoints() {
        let graph = MemoryGraph::new();
        let (c1, o1, missing) = (Value::Int(1), Value::Int(10), Value::Int(99));

        let mut batch = graph.begin_batch().await.unwrap();
        batch
            .merge_node("Customer", "id", &c1, &Properties::new())
            .await
            .unwrap();
        batch
            .merge_node("Order", "order_id", &o1, &Properties::new())
            .await
            .unwrap();

        let ok = batch
            .merge_relationship(
                "Order_TO_Customer",
                NodeRef::new("Order", "order_id", &o1),
                NodeRef::new("Customer", "id", &c1),
                &Properties::new(),
            )
            .await
            .unwrap();
        let dangling = batch
            .merge_relationship(
                "Order_TO_Customer",
                NodeRef::new("Order", "order_id", &o1),
                NodeRef::new("Customer", "id", &missing),
                &Properties::new(),
            )
            .await
            .unwrap();
        batch.commit().await.unwrap();

        assert_eq!(ok, MergeOutcome::Created);
        assert_eq!(dangling, MergeOutcome::MissingEndpoint);
        assert_eq!(graph.relationship_count(), 1);
    }

    #[tokio::test]
    async fn rollback_discards_pending_writes() {
        let graph = MemoryGraph::new();
        let mut batch = graph.begin_batch().await.unwrap();
        batch
            .merge_node("Customer", "id", &Value::Int(1), &Properties::new())
            .await
            .unwrap();
        batch.rollback().await.unwrap();

        assert_eq!(graph.node_count(), 0);
        assert_eq!(graph.committed_batches(), 0);
    }

    #[tokio::test]
    async fn injected_failures() {
        let graph = MemoryGraph::new();
        graph.reject_value("bad");

        let mut batch = graph.begin_batch().await.unwrap();
        let err = batch
            .merge_node("Customer", "id", &Value::from("bad"), &Properties::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Rejected(_)));

        graph.set_offline(true);
        let err = graph.begin_batch().await.err().unwrap();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn statistics_and_clear() {
        let graph = MemoryGraph::new();
        graph.declare_unique_constraint("Customer", "id").await.unwrap();
        let mut batch = graph.begin_batch().await.unwrap();
        for i in 0..3 {
            batch
                .merge_node("Customer", "id", &Value::Int(i), &Properties::new())
                .await
                .unwrap();
        }
        batch.commit().await.unwrap();

        let stats = graph.statistics().await.unwrap();
        assert_eq!(stats.node_count, 3);
        assert_eq!(stats.label_counts["Customer"], 3);
        assert!(graph.has_constraint("Customer", "id"));

        assert_eq!(graph.clear().await.unwrap(), 3);
        assert_eq!(graph.node_count(), 0);
    }
}
