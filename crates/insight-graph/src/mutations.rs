//! Write operations against Neo4j.
//!
//! All mutations use MERGE (upsert) semantics keyed by the entity's
//! identifier property, so rebuilding from the same input is idempotent.
//! Labels, relationship types and property names come from user data and are
//! always backtick-quoted.

use std::collections::HashMap;

use async_trait::async_trait;
use neo4rs::{query, BoltNull, BoltType, Txn};

use insight_core::Value;

use crate::client::{GraphClient, GraphError};
use crate::mutator::{GraphMutator, MergeOutcome, MutationBatch, NodeRef, Properties, StoreError};
use crate::queries::GraphStatistics;

#[async_trait]
impl GraphMutator for GraphClient {
    async fn declare_unique_constraint(
        &self,
        label: &str,
        property: &str,
    ) -> Result<(), StoreError> {
        let cypher = format!(
            "CREATE CONSTRAINT {name} IF NOT EXISTS
             FOR (n:{label}) REQUIRE n.{property} IS UNIQUE",
            name = quote(&constraint_name(label, property)),
            label = quote(label),
            property = quote(property),
        );
        self.write(query(&cypher)).await?;
        tracing::debug!(label, property, "Uniqueness constraint declared");
        Ok(())
    }

    async fn begin_batch(&self) -> Result<Box<dyn MutationBatch>, StoreError> {
        let txn = self.begin_txn().await?;
        Ok(Box::new(Neo4jBatch { txn: Some(txn) }))
    }

    async fn clear(&self) -> Result<u64, StoreError> {
        Ok(self.clear_database().await?)
    }

    async fn statistics(&self) -> Result<GraphStatistics, StoreError> {
        Ok(self.graph_statistics().await?)
    }
}

/// A Neo4j transaction holding one batch of merges.
pub struct Neo4jBatch {
    txn: Option<Txn>,
}

impl Neo4jBatch {
    fn txn(&mut self) -> Result<&mut Txn, StoreError> {
        self.txn
            .as_mut()
            .ok_or_else(|| StoreError::Rejected("batch already closed".to_string()))
    }

    /// Run a merge statement that returns a single `existed` column.
    /// No row back means a MATCH clause found nothing.
    async fn run_merge(&mut self, q: neo4rs::Query) -> Result<MergeOutcome, StoreError> {
        let txn = self.txn()?;
        let mut stream = txn.execute(q).await.map_err(GraphError::from)?;
        let row = stream.next(txn.handle()).await.map_err(GraphError::from)?;

        Ok(match row {
            None => MergeOutcome::MissingEndpoint,
            Some(row) => {
                if row.get::<bool>("existed").unwrap_or(false) {
                    MergeOutcome::Merged
                } else {
                    MergeOutcome::Created
                }
            }
        })
    }
}

#[async_trait]
impl MutationBatch for Neo4jBatch {
    async fn merge_node(
        &mut self,
        label: &str,
        id_property: &str,
        id: &Value,
        attributes: &Properties,
    ) -> Result<MergeOutcome, StoreError> {
        let cypher = format!(
            "OPTIONAL MATCH (existing:{label} {{{prop}: $id}})
             WITH count(existing) > 0 AS existed
             MERGE (n:{label} {{{prop}: $id}})
             SET n += $props
             RETURN existed",
            label = quote(label),
            prop = quote(id_property),
        );

        let q = query(&cypher)
            .param("id", to_bolt(id))
            .param("props", to_bolt_map(attributes));

        self.run_merge(q).await
    }

    async fn merge_relationship(
        &mut self,
        rel_type: &str,
        source: NodeRef<'_>,
        target: NodeRef<'_>,
        attributes: &Properties,
    ) -> Result<MergeOutcome, StoreError> {
        let cypher = format!(
            "MATCH (a:{source_label} {{{source_prop}: $source_id}})
             MATCH (b:{target_label} {{{target_prop}: $target_id}})
             OPTIONAL MATCH (a)-[existing:{rel_type}]->(b)
             WITH a, b, count(existing) > 0 AS existed
             MERGE (a)-[r:{rel_type}]->(b)
             SET r += $props
             RETURN existed",
            source_label = quote(source.label),
            source_prop = quote(source.id_property),
            target_label = quote(target.label),
            target_prop = quote(target.id_property),
            rel_type = quote(rel_type),
        );

        let q = query(&cypher)
            .param("source_id", to_bolt(source.id))
            .param("target_id", to_bolt(target.id))
            .param("props", to_bolt_map(attributes));

        self.run_merge(q).await
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        if let Some(txn) = self.txn.take() {
            txn.commit().await.map_err(GraphError::from)?;
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        if let Some(txn) = self.txn.take() {
            txn.rollback().await.map_err(GraphError::from)?;
        }
        Ok(())
    }
}

// ── Helpers ──────────────────────────────────────────────────────

/// Backtick-quote a label, relationship type or property name.
pub(crate) fn quote(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

fn constraint_name(label: &str, property: &str) -> String {
    format!("insight_{label}_{property}_unique")
}

fn to_bolt(value: &Value) -> BoltType {
    match value {
        Value::Null => BoltType::Null(BoltNull),
        Value::Bool(b) => BoltType::from(*b),
        Value::Int(i) => BoltType::from(*i),
        Value::Float(x) => BoltType::from(*x),
        Value::DateTime(_) | Value::Text(_) => BoltType::from(value.to_string()),
    }
}

fn to_bolt_map(props: &Properties) -> HashMap<String, BoltType> {
    props
        .iter()
        .map(|(k, v)| (k.clone(), to_bolt(v)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_escapes_backticks() {
        assert_eq!(quote("Customer"), "`Customer`");
        assert_eq!(quote("odd`name"), "`odd``name`");
        assert_eq!(quote("order date"), "`order date`");
    }

    #[test]
    fn values_map_to_bolt_scalars() {
        let dt = insight_core::value::parse_datetime("2024-05-01", &["%Y-%m-%d"]).unwrap();
        assert!(matches!(to_bolt(&Value::DateTime(dt)), BoltType::String(_)));
        assert!(matches!(to_bolt(&Value::Int(3)), BoltType::Integer(_)));
        assert!(matches!(to_bolt(&Value::Null), BoltType::Null(_)));
    }

    #[test]
    fn constraint_names_are_stable() {
        assert_eq!(
            constraint_name("Customer", "id"),
            "insight_Customer_id_unique"
        );
    }
}
