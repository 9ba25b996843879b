//! Knowledge graph routes: full graph, search, node detail, node/edge
//! creation, timeline, and subgraph context rendering.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use validator::Validate;

use lorekeeper_domain::{
    CampaignId, Direction, EdgeType, GraphEdge, GraphNode, NodeId, NodeType, Properties,
};

use super::{validation_error, ApiError, AppState};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/campaigns/{campaign_id}/knowledge", get(full_graph))
        .route("/api/campaigns/{campaign_id}/knowledge/search", get(search))
        .route("/api/campaigns/{campaign_id}/knowledge/timeline", get(timeline))
        .route("/api/campaigns/{campaign_id}/knowledge/context", post(render_context))
        .route("/api/campaigns/{campaign_id}/knowledge/nodes", post(create_node))
        .route("/api/campaigns/{campaign_id}/knowledge/edges", post(create_edge))
        .route("/api/campaigns/{campaign_id}/knowledge/{node_id}", get(node_detail))
}

#[derive(Debug, Deserialize, Validate)]
struct SearchQuery {
    #[validate(length(min = 1))]
    q: String,
    node_type: Option<String>,
    #[serde(default = "default_search_limit")]
    #[validate(range(min = 1, max = 100))]
    limit: usize,
}

fn default_search_limit() -> usize {
    20
}

#[derive(Debug, Deserialize)]
struct TimelineQuery {
    #[serde(default = "default_timeline_limit")]
    limit: usize,
}

fn default_timeline_limit() -> usize {
    50
}

#[derive(Debug, Deserialize, Validate)]
struct CreateNodeRequest {
    node_type: String,
    #[validate(length(min = 1, max = 255))]
    name: String,
    description: Option<String>,
    entity_id: Option<String>,
    entity_type: Option<String>,
    #[serde(default)]
    properties: Properties,
    #[serde(default = "default_importance")]
    importance: i32,
}

fn default_importance() -> i32 {
    5
}

#[derive(Debug, Deserialize)]
struct CreateEdgeRequest {
    source_id: String,
    target_id: String,
    edge_type: String,
    #[serde(default)]
    properties: Properties,
}

#[derive(Debug, Deserialize)]
struct ContextRequest {
    #[serde(default)]
    entity_ids: Vec<String>,
    #[serde(default = "default_depth")]
    max_depth: usize,
    #[serde(default = "default_max_nodes")]
    max_nodes: usize,
}

fn default_depth() -> usize {
    2
}

fn default_max_nodes() -> usize {
    50
}

#[derive(Debug, Serialize)]
struct FullGraphResponse {
    campaign_id: CampaignId,
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
    node_count: usize,
    edge_count: usize,
}

fn parse_campaign(raw: &str) -> Result<CampaignId, ApiError> {
    CampaignId::parse(raw).map_err(|_| ApiError::invalid_id("campaign"))
}

async fn require_campaign(state: &AppState, campaign_id: CampaignId) -> Result<(), ApiError> {
    let mut conn = state.store.acquire().await?;
    state
        .store
        .campaigns()
        .get(&mut conn, campaign_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Campaign not found"))?;
    Ok(())
}

async fn full_graph(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<String>,
) -> Result<Json<FullGraphResponse>, ApiError> {
    let campaign_id = parse_campaign(&campaign_id)?;
    require_campaign(&state, campaign_id).await?;

    let mut conn = state.store.acquire().await?;
    let nodes = state.store.knowledge().load_nodes(&mut conn, campaign_id).await?;
    let edges = state.store.knowledge().load_edges(&mut conn, campaign_id).await?;

    Ok(Json(FullGraphResponse {
        campaign_id,
        node_count: nodes.len(),
        edge_count: edges.len(),
        nodes,
        edges,
    }))
}

async fn search(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<String>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Value>, ApiError> {
    query.validate().map_err(validation_error)?;
    let campaign_id = parse_campaign(&campaign_id)?;
    require_campaign(&state, campaign_id).await?;

    let node_type = query
        .node_type
        .as_deref()
        .map(str::parse::<NodeType>)
        .transpose()
        .map_err(|err| ApiError::bad_request(err.to_string()))?;

    let graph = crate::services::locked_graph(&state.store, &state.registry, campaign_id).await?;
    let results = graph.search(&query.q, node_type, query.limit);
    let total = results.len();
    Ok(Json(json!({
        "query": query.q,
        "results": results,
        "total": total,
    })))
}

async fn node_detail(
    State(state): State<Arc<AppState>>,
    Path((campaign_id, node_id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let campaign_id = parse_campaign(&campaign_id)?;
    require_campaign(&state, campaign_id).await?;

    let graph = crate::services::locked_graph(&state.store, &state.registry, campaign_id).await?;
    let node = graph
        .get_entity(&node_id)
        .cloned()
        .ok_or_else(|| ApiError::not_found("Knowledge node not found"))?;
    let connections = graph.get_neighbors(&node_id, None, Direction::Both, 1);

    Ok(Json(json!({
        "node": node,
        "connections": connections,
    })))
}

async fn create_node(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<String>,
    Json(body): Json<CreateNodeRequest>,
) -> Result<(StatusCode, Json<GraphNode>), ApiError> {
    body.validate().map_err(validation_error)?;
    let campaign_id = parse_campaign(&campaign_id)?;
    require_campaign(&state, campaign_id).await?;

    let node_type = body
        .node_type
        .parse::<NodeType>()
        .map_err(|err| ApiError::bad_request(err.to_string()))?;

    let mut conn = state.store.acquire().await?;
    let mut graph = state.registry.lock(campaign_id).await?;
    crate::services::ensure_graph_loaded(&mut conn, &mut graph, campaign_id).await?;

    let mut properties = body.properties;
    if let Some(entity_id) = body.entity_id {
        properties.insert("entity_id".to_string(), Value::String(entity_id));
    }
    if let Some(entity_type) = body.entity_type {
        properties.insert("entity_type".to_string(), Value::String(entity_type));
    }

    let node = graph
        .add_entity(
            NodeId::new().to_string(),
            node_type,
            body.name,
            body.description,
            Some(properties),
            body.importance,
        )
        .clone();

    state
        .store
        .knowledge()
        .upsert_node(&mut conn, campaign_id, &node)
        .await?;
    Ok((StatusCode::CREATED, Json(node)))
}

async fn create_edge(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<String>,
    Json(body): Json<CreateEdgeRequest>,
) -> Result<(StatusCode, Json<GraphEdge>), ApiError> {
    let campaign_id = parse_campaign(&campaign_id)?;
    require_campaign(&state, campaign_id).await?;

    let edge_type = body
        .edge_type
        .parse::<EdgeType>()
        .map_err(|err| ApiError::bad_request(err.to_string()))?;

    let mut conn = state.store.acquire().await?;
    let mut graph = state.registry.lock(campaign_id).await?;
    crate::services::ensure_graph_loaded(&mut conn, &mut graph, campaign_id).await?;

    let edge = graph
        .add_relationship(
            &body.source_id,
            &body.target_id,
            edge_type,
            Some(body.properties),
        )
        .map_err(|err| ApiError::bad_request(err.to_string()))?;

    state.store.knowledge().upsert_edge(&mut conn, &edge).await?;
    Ok((StatusCode::CREATED, Json(edge)))
}

async fn timeline(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<String>,
    Query(query): Query<TimelineQuery>,
) -> Result<Json<Value>, ApiError> {
    let campaign_id = parse_campaign(&campaign_id)?;
    require_campaign(&state, campaign_id).await?;

    let graph = crate::services::locked_graph(&state.store, &state.registry, campaign_id).await?;
    let events = graph.get_timeline(query.limit.clamp(1, 200));
    let total = events.len();
    Ok(Json(json!({ "events": events, "total": total })))
}

async fn render_context(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<String>,
    Json(body): Json<ContextRequest>,
) -> Result<Json<Value>, ApiError> {
    let campaign_id = parse_campaign(&campaign_id)?;
    require_campaign(&state, campaign_id).await?;

    let graph = crate::services::locked_graph(&state.store, &state.registry, campaign_id).await?;
    let context = graph.render_for_prompt(&body.entity_ids, body.max_depth, body.max_nodes);
    Ok(Json(json!({
        "campaign_id": campaign_id,
        "context": context,
        "entity_count": body.entity_ids.len(),
    })))
}
