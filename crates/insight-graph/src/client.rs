//! Neo4j connection for graph construction.

use neo4rs::{query, ConfigBuilder, Graph, Query, Row, Txn};
use serde::Deserialize;

use crate::mutator::StoreError;

/// Errors from graph operations.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Neo4j connection error: {0}")]
    Connection(String),

    #[error("Neo4j query error: {0}")]
    Query(#[from] neo4rs::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl GraphError {
    /// True when the server cannot be reached at all, as opposed to a
    /// statement it refused.
    pub fn is_connectivity(&self) -> bool {
        match self {
            Self::Connection(_) => true,
            Self::Query(e) => matches!(
                e,
                neo4rs::Error::IOError { .. }
                    | neo4rs::Error::ConnectionError { .. }
                    | neo4rs::Error::AuthenticationError { .. }
            ),
            Self::Serialization(_) => false,
        }
    }
}

impl From<GraphError> for StoreError {
    fn from(e: GraphError) -> Self {
        if e.is_connectivity() {
            StoreError::Unavailable(e.to_string())
        } else {
            StoreError::Rejected(e.to_string())
        }
    }
}

/// `[neo4j]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
    /// Target database; the server default when unset.
    pub database: Option<String>,
    pub max_connections: u32,
    pub fetch_size: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password: "insight-dev".to_string(),
            database: None,
            max_connections: 16,
            fetch_size: 256,
        }
    }
}

/// Pooled Neo4j client. Clone is cheap (inner Arc).
#[derive(Clone)]
pub struct GraphClient {
    graph: Graph,
}

impl GraphClient {
    /// Connect and check that the server answers before any build starts.
    pub async fn connect(config: &GraphConfig) -> Result<Self, GraphError> {
        let mut builder = ConfigBuilder::default()
            .uri(&config.uri)
            .user(&config.user)
            .password(&config.password)
            .max_connections(config.max_connections as usize)
            .fetch_size(config.fetch_size);
        if let Some(db) = &config.database {
            builder = builder.db(db.as_str());
        }
        let neo_config = builder
            .build()
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        let graph = Graph::connect(neo_config)
            .await
            .map_err(|e| GraphError::Connection(e.to_string()))?;
        let client = Self { graph };
        client.ping().await?;

        tracing::info!(
            uri = %config.uri,
            database = config.database.as_deref().unwrap_or("default"),
            "Connected to Neo4j"
        );
        Ok(client)
    }

    async fn ping(&self) -> Result<(), GraphError> {
        self.fetch_one(query("RETURN 1 AS ok"))
            .await
            .map(|_| ())
            .map_err(|e| GraphError::Connection(format!("server did not answer: {e}")))
    }

    /// Auto-commit write (schema statements, DETACH DELETE).
    pub async fn write(&self, query: Query) -> Result<(), GraphError> {
        self.graph.run(query).await?;
        Ok(())
    }

    pub async fn fetch_all(&self, query: Query) -> Result<Vec<Row>, GraphError> {
        let mut stream = self.graph.execute(query).await?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    pub async fn fetch_one(&self, query: Query) -> Result<Option<Row>, GraphError> {
        let mut stream = self.graph.execute(query).await?;
        Ok(stream.next().await?)
    }

    /// Open the explicit transaction one construction batch runs in.
    pub async fn begin_txn(&self) -> Result<Txn, GraphError> {
        Ok(self.graph.start_txn().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_section_fills_missing_fields() {
        let cfg: GraphConfig =
            serde_json::from_str(r#"{"uri": "bolt://graph:7687", "database": "sales"}"#).unwrap();
        assert_eq!(cfg.uri, "bolt://graph:7687");
        assert_eq!(cfg.database.as_deref(), Some("sales"));
        assert_eq!(cfg.user, "neo4j");
        assert_eq!(cfg.max_connections, 16);
    }

    #[test]
    fn connection_errors_map_to_unavailable() {
        let err: StoreError = GraphError::Connection("refused".into()).into();
        assert!(matches!(err, StoreError::Unavailable(_)));

        let err: StoreError = GraphError::Serialization("bad".into()).into();
        assert!(matches!(err, StoreError::Rejected(_)));
    }
}
