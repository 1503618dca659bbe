//! Integration tests for insight-graph against a live Neo4j instance.
//!
//! Run with: cargo test --package insight-graph --test integration -- --ignored
//!
//! Skipped automatically if Neo4j is not available. Every test writes under a
//! unique label so runs never collide with real data.

use insight_core::Value;
use insight_graph::{GraphClient, GraphConfig, GraphMutator, MergeOutcome, NodeRef, Properties};

async fn connect_or_skip() -> Option<GraphClient> {
    let config = GraphConfig::default();
    match GraphClient::connect(&config).await {
        Ok(client) => Some(client),
        Err(e) => {
            eprintln!("Skipping integration test (Neo4j not available): {e}");
            None
        }
    }
}

fn unique_label(prefix: &str) -> String {
    format!("{prefix}_{}", std::process::id())
}

async fn cleanup(client: &GraphClient, label: &str) {
    let cypher = format!("MATCH (n:`{label}`) DETACH DELETE n");
    let _ = client.write(neo4rs::query(&cypher)).await;
}

fn props(pairs: &[(&str, Value)]) -> Properties {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn test_merge_node_created_then_merged() {
    let Some(client) = connect_or_skip().await else {
        return;
    };
    let label = unique_label("ItCustomer");
    cleanup(&client, &label).await;

    client.declare_unique_constraint(&label, "id").await.unwrap();
    // Declaring twice is a no-op.
    client.declare_unique_constraint(&label, "id").await.unwrap();

    let id = Value::Int(1);
    let mut batch = client.begin_batch().await.unwrap();
    let first = batch
        .merge_node(&label, "id", &id, &props(&[("name", "Ada".into())]))
        .await
        .unwrap();
    batch.commit().await.unwrap();

    let mut batch = client.begin_batch().await.unwrap();
    let second = batch
        .merge_node(&label, "id", &id, &props(&[("name", "Grace".into())]))
        .await
        .unwrap();
    batch.commit().await.unwrap();

    assert_eq!(first, MergeOutcome::Created);
    assert_eq!(second, MergeOutcome::Merged);
    assert_eq!(client.count_nodes(&label).await.unwrap(), 1);

    cleanup(&client, &label).await;
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn test_relationship_with_missing_endpoint() {
    let Some(client) = connect_or_skip().await else {
        return;
    };
    let customer = unique_label("ItCust");
    let order = unique_label("ItOrder");
    let rel_type = unique_label("IT_ORDER_TO_CUSTOMER");
    cleanup(&client, &customer).await;
    cleanup(&client, &order).await;

    let (c1, o1, missing) = (Value::Int(1), Value::Int(10), Value::Int(99));
    let mut batch = client.begin_batch().await.unwrap();
    batch
        .merge_node(&customer, "id", &c1, &Properties::new())
        .await
        .unwrap();
    batch
        .merge_node(&order, "order_id", &o1, &Properties::new())
        .await
        .unwrap();

    let linked = batch
        .merge_relationship(
            &rel_type,
            NodeRef::new(&order, "order_id", &o1),
            NodeRef::new(&customer, "id", &c1),
            &Properties::new(),
        )
        .await
        .unwrap();
    let dangling = batch
        .merge_relationship(
            &rel_type,
            NodeRef::new(&order, "order_id", &o1),
            NodeRef::new(&customer, "id", &missing),
            &Properties::new(),
        )
        .await
        .unwrap();
    batch.commit().await.unwrap();

    assert_eq!(linked, MergeOutcome::Created);
    assert_eq!(dangling, MergeOutcome::MissingEndpoint);
    assert_eq!(client.count_relationships(&rel_type).await.unwrap(), 1);

    cleanup(&client, &customer).await;
    cleanup(&client, &order).await;
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn test_rollback_leaves_no_nodes() {
    let Some(client) = connect_or_skip().await else {
        return;
    };
    let label = unique_label("ItRollback");
    cleanup(&client, &label).await;

    let mut batch = client.begin_batch().await.unwrap();
    batch
        .merge_node(&label, "id", &Value::from("a"), &Properties::new())
        .await
        .unwrap();
    batch.rollback().await.unwrap();

    assert_eq!(client.count_nodes(&label).await.unwrap(), 0);
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn test_statistics_include_label_counts() {
    let Some(client) = connect_or_skip().await else {
        return;
    };
    let label = unique_label("ItStats");
    cleanup(&client, &label).await;

    let mut batch = client.begin_batch().await.unwrap();
    for i in 0..3 {
        batch
            .merge_node(&label, "id", &Value::Int(i), &Properties::new())
            .await
            .unwrap();
    }
    batch.commit().await.unwrap();

    let stats = client.graph_statistics().await.unwrap();
    assert_eq!(stats.label_counts.get(&label), Some(&3));
    assert!(stats.node_count >= 3);

    cleanup(&client, &label).await;
}
