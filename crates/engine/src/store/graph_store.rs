//! Hydration between the in-memory knowledge graph and the store.
//!
//! Loads are all-or-nothing: the graph is cleared, every campaign node is
//! inserted, then every edge whose endpoints both loaded. A generator call
//! never sees a partially loaded graph because the load runs to completion
//! under the campaign lock before any context is rendered.
//!
//! Saves are non-destructive merges: every in-memory node and edge is
//! upserted, and rows absent from memory are left alone. Removing something
//! from the store requires the explicit delete calls on `KnowledgeRepo`.

use sqlx::SqliteConnection;

use lorekeeper_domain::{CampaignId, KnowledgeGraph};

use super::{KnowledgeRepo, StoreError};

/// Replace the graph's contents with the campaign's persisted state.
pub async fn load_graph(
    conn: &mut SqliteConnection,
    campaign_id: CampaignId,
) -> Result<KnowledgeGraph, StoreError> {
    let repo = KnowledgeRepo;
    let mut graph = KnowledgeGraph::new();
    graph.set_campaign_id(campaign_id);

    let nodes = repo.load_nodes(conn, campaign_id).await?;
    for node in nodes {
        graph.insert_node(node);
    }

    let edges = repo.load_edges(conn, campaign_id).await?;
    for edge in edges {
        // The edge query guarantees both endpoints, but a node could fail
        // to hydrate; skip rather than poison the whole load.
        if graph.insert_edge(edge).is_err() {
            tracing::warn!(campaign_id = %campaign_id, "skipping edge with missing endpoint");
        }
    }

    tracing::debug!(
        campaign_id = %campaign_id,
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        "knowledge graph loaded"
    );
    Ok(graph)
}

/// Upsert every in-memory node and edge. Never deletes.
pub async fn save_graph(
    conn: &mut SqliteConnection,
    campaign_id: CampaignId,
    graph: &KnowledgeGraph,
) -> Result<(), StoreError> {
    let repo = KnowledgeRepo;
    let export = graph.serialize();
    for node in &export.nodes {
        repo.upsert_node(conn, campaign_id, node).await?;
    }
    for edge in &export.edges {
        repo.upsert_edge(conn, edge).await?;
    }
    Ok(())
}
