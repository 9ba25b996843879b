//! Knowledge graph table access.
//!
//! Node save is upsert-by-id; edge save is upsert-by-(source, target, type).
//! Saving never deletes rows absent from memory - removal workflows call
//! the explicit delete operations.

use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use lorekeeper_domain::{CampaignId, EdgeType, GraphEdge, GraphNode, Properties};

use super::{from_json, parse_enum, parse_ts, to_json, ts, StoreError};

pub struct KnowledgeRepo;

impl KnowledgeRepo {
    pub async fn upsert_node(
        &self,
        conn: &mut SqliteConnection,
        campaign_id: CampaignId,
        node: &GraphNode,
    ) -> Result<(), StoreError> {
        // The entity back-reference lives in the node's property bag in
        // memory; persist it into its own columns.
        let entity_id = node.properties.get("entity_id").and_then(|v| v.as_str());
        let entity_type = node.properties.get("entity_type").and_then(|v| v.as_str());

        sqlx::query(
            r#"
            INSERT INTO knowledge_nodes (id, campaign_id, node_type, name, description,
                                         entity_id, entity_type, properties, importance,
                                         created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                node_type = excluded.node_type,
                name = excluded.name,
                description = excluded.description,
                entity_id = excluded.entity_id,
                entity_type = excluded.entity_type,
                properties = excluded.properties,
                importance = excluded.importance,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&node.id)
        .bind(campaign_id.to_string())
        .bind(node.node_type.as_str())
        .bind(&node.name)
        .bind(&node.description)
        .bind(entity_id)
        .bind(entity_type)
        .bind(to_json(&node.properties)?)
        .bind(node.importance)
        .bind(ts(&node.created_at))
        .bind(ts(&node.updated_at))
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn upsert_edge(
        &self,
        conn: &mut SqliteConnection,
        edge: &GraphEdge,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO knowledge_edges (id, source_id, target_id, edge_type, properties,
                                         is_active, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(source_id, target_id, edge_type) DO UPDATE SET
                properties = excluded.properties,
                is_active = excluded.is_active
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&edge.source)
        .bind(&edge.target)
        .bind(edge.edge_type.as_str())
        .bind(to_json(&edge.properties)?)
        .bind(edge.is_active)
        .bind(ts(&edge.created_at))
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn get_node(
        &self,
        conn: &mut SqliteConnection,
        campaign_id: CampaignId,
        node_id: &str,
    ) -> Result<Option<GraphNode>, StoreError> {
        let row = sqlx::query("SELECT * FROM knowledge_nodes WHERE id = ? AND campaign_id = ?")
            .bind(node_id)
            .bind(campaign_id.to_string())
            .fetch_optional(conn)
            .await?;
        row.map(row_to_node).transpose()
    }

    pub async fn load_nodes(
        &self,
        conn: &mut SqliteConnection,
        campaign_id: CampaignId,
    ) -> Result<Vec<GraphNode>, StoreError> {
        let rows =
            sqlx::query("SELECT * FROM knowledge_nodes WHERE campaign_id = ? ORDER BY created_at, id")
                .bind(campaign_id.to_string())
                .fetch_all(conn)
                .await?;
        rows.into_iter().map(row_to_node).collect()
    }

    /// Edges of a campaign: only those whose endpoints are both campaign
    /// nodes are returned.
    pub async fn load_edges(
        &self,
        conn: &mut SqliteConnection,
        campaign_id: CampaignId,
    ) -> Result<Vec<GraphEdge>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT e.* FROM knowledge_edges e
            JOIN knowledge_nodes s ON s.id = e.source_id
            JOIN knowledge_nodes t ON t.id = e.target_id
            WHERE s.campaign_id = ?1 AND t.campaign_id = ?1
            ORDER BY e.created_at, e.id
            "#,
        )
        .bind(campaign_id.to_string())
        .fetch_all(conn)
        .await?;
        rows.into_iter().map(row_to_edge).collect()
    }

    /// Explicit node delete; incident edges cascade.
    pub async fn delete_node(
        &self,
        conn: &mut SqliteConnection,
        campaign_id: CampaignId,
        node_id: &str,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM knowledge_nodes WHERE id = ? AND campaign_id = ?")
            .bind(node_id)
            .bind(campaign_id.to_string())
            .execute(conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Explicit edge delete: one type, or every edge between the pair.
    pub async fn delete_edge(
        &self,
        conn: &mut SqliteConnection,
        source_id: &str,
        target_id: &str,
        edge_type: Option<EdgeType>,
    ) -> Result<u64, StoreError> {
        let result = match edge_type {
            Some(edge_type) => {
                sqlx::query(
                    "DELETE FROM knowledge_edges WHERE source_id = ? AND target_id = ? AND edge_type = ?",
                )
                .bind(source_id)
                .bind(target_id)
                .bind(edge_type.as_str())
                .execute(conn)
                .await?
            }
            None => {
                sqlx::query("DELETE FROM knowledge_edges WHERE source_id = ? AND target_id = ?")
                    .bind(source_id)
                    .bind(target_id)
                    .execute(conn)
                    .await?
            }
        };
        Ok(result.rows_affected())
    }
}

fn row_to_node(row: sqlx::sqlite::SqliteRow) -> Result<GraphNode, StoreError> {
    let mut properties: Properties = from_json(row.get::<String, _>("properties").as_str())?;
    if let Some(entity_id) = row.get::<Option<String>, _>("entity_id") {
        properties.insert("entity_id".to_string(), serde_json::Value::String(entity_id));
    }
    if let Some(entity_type) = row.get::<Option<String>, _>("entity_type") {
        properties.insert(
            "entity_type".to_string(),
            serde_json::Value::String(entity_type),
        );
    }
    let description: Option<String> = row.get("description");
    Ok(GraphNode {
        id: row.get("id"),
        node_type: parse_enum(row.get::<String, _>("node_type").as_str())?,
        name: row.get("name"),
        description: description.unwrap_or_default(),
        properties,
        importance: row.get("importance"),
        created_at: parse_ts(row.get::<String, _>("created_at").as_str())?,
        updated_at: parse_ts(row.get::<String, _>("updated_at").as_str())?,
    })
}

fn row_to_edge(row: sqlx::sqlite::SqliteRow) -> Result<GraphEdge, StoreError> {
    Ok(GraphEdge {
        source: row.get("source_id"),
        target: row.get("target_id"),
        edge_type: parse_enum(row.get::<String, _>("edge_type").as_str())?,
        properties: from_json(row.get::<String, _>("properties").as_str())?,
        created_at: parse_ts(row.get::<String, _>("created_at").as_str())?,
        is_active: row.get("is_active"),
    })
}
