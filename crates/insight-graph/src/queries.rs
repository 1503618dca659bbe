//! Read and maintenance queries: graph statistics and clearing.

use std::collections::BTreeMap;

use neo4rs::query;
use serde::{Deserialize, Serialize};

use crate::client::{GraphClient, GraphError};
use crate::mutations::quote;

/// Size of the graph after (or before) a build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStatistics {
    pub node_count: u64,
    pub relationship_count: u64,
    /// Nodes per label.
    pub label_counts: BTreeMap<String, u64>,
    /// Relationships per type.
    pub relationship_type_counts: BTreeMap<String, u64>,
}

impl GraphClient {
    // ── Counts ───────────────────────────────────────────────────

    /// Count nodes carrying a given label.
    pub async fn count_nodes(&self, label: &str) -> Result<u64, GraphError> {
        let cypher = format!(
            "MATCH (n:{label})
             RETURN count(n) AS cnt",
            label = quote(label)
        );
        self.count(query(&cypher)).await
    }

    /// Count relationships of a given type.
    pub async fn count_relationships(&self, rel_type: &str) -> Result<u64, GraphError> {
        let cypher = format!(
            "MATCH ()-[r:{rel_type}]->()
             RETURN count(r) AS cnt",
            rel_type = quote(rel_type)
        );
        self.count(query(&cypher)).await
    }

    /// Node/relationship totals plus per-label and per-type breakdowns.
    pub async fn graph_statistics(&self) -> Result<GraphStatistics, GraphError> {
        let node_count = self.count(query("MATCH (n) RETURN count(n) AS cnt")).await?;
        let relationship_count = self
            .count(query("MATCH ()-[r]->() RETURN count(r) AS cnt"))
            .await?;

        let mut label_counts = BTreeMap::new();
        let rows = self
            .fetch_all(query(
                "MATCH (n) UNWIND labels(n) AS label
                 RETURN label, count(*) AS cnt",
            ))
            .await?;
        for row in rows {
            let label: String = row.get("label").unwrap_or_default();
            let cnt = row.get::<i64>("cnt").unwrap_or(0);
            label_counts.insert(label, cnt.max(0) as u64);
        }

        let mut relationship_type_counts = BTreeMap::new();
        let rows = self
            .fetch_all(query(
                "MATCH ()-[r]->()
                 RETURN type(r) AS rel_type, count(*) AS cnt",
            ))
            .await?;
        for row in rows {
            let rel_type: String = row.get("rel_type").unwrap_or_default();
            let cnt = row.get::<i64>("cnt").unwrap_or(0);
            relationship_type_counts.insert(rel_type, cnt.max(0) as u64);
        }

        Ok(GraphStatistics {
            node_count,
            relationship_count,
            label_counts,
            relationship_type_counts,
        })
    }

    // ── Maintenance ──────────────────────────────────────────────

    /// Delete every node and relationship. Returns the number of deleted nodes.
    pub async fn clear_database(&self) -> Result<u64, GraphError> {
        let deleted = self
            .count(query("MATCH (n) DETACH DELETE n RETURN count(n) AS cnt"))
            .await?;
        tracing::info!(deleted, "Cleared graph database");
        Ok(deleted)
    }

    async fn count(&self, q: neo4rs::Query) -> Result<u64, GraphError> {
        match self.fetch_one(q).await? {
            Some(row) => Ok(row.get::<i64>("cnt").unwrap_or(0).max(0) as u64),
            None => Ok(0),
        }
    }
}
