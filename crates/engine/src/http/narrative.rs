//! Narrative routes: story beats, openings, choices, the story feed, and
//! recaps.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use validator::Validate;

use lorekeeper_domain::{EventId, SessionId, StoryEvent};

use crate::services::RecapSummary;

use super::{validation_error, ApiError, AppState};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/sessions/{session_id}/action", post(player_action))
        .route("/api/sessions/{session_id}/opening", post(opening_scene))
        .route("/api/sessions/{session_id}/choice", post(choose))
        .route("/api/sessions/{session_id}/story", get(story_feed))
        .route("/api/sessions/{session_id}/recap", post(recap))
        .route("/api/events/{event_id}", get(get_event))
}

#[derive(Debug, Deserialize, Validate)]
struct ActionRequest {
    #[validate(length(min = 1))]
    action: String,
    context: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpeningRequest {
    #[serde(default = "default_style")]
    style: String,
    #[serde(default)]
    include_recap: bool,
}

fn default_style() -> String {
    "dramatic".to_string()
}

impl Default for OpeningRequest {
    fn default() -> Self {
        Self {
            style: default_style(),
            include_recap: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChoiceRequest {
    event_id: String,
    choice_index: i32,
}

#[derive(Debug, Deserialize)]
struct StoryFeedQuery {
    #[serde(default)]
    skip: i64,
    #[serde(default = "default_feed_limit")]
    limit: i64,
}

fn default_feed_limit() -> i64 {
    50
}

#[derive(Debug, Serialize)]
struct StoryFeedResponse {
    session_id: SessionId,
    events: Vec<StoryEvent>,
    total: i64,
}

async fn player_action(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(body): Json<ActionRequest>,
) -> Result<Json<StoryEvent>, ApiError> {
    body.validate().map_err(validation_error)?;
    let session_id = SessionId::parse(&session_id).map_err(|_| ApiError::invalid_id("session"))?;
    let event = state
        .narrative
        .generate_story_beat(session_id, &body.action, body.context.as_deref())
        .await?;
    Ok(Json(event))
}

async fn opening_scene(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    body: Option<Json<OpeningRequest>>,
) -> Result<Json<StoryEvent>, ApiError> {
    let session_id = SessionId::parse(&session_id).map_err(|_| ApiError::invalid_id("session"))?;
    let body = body.map(|Json(body)| body).unwrap_or_default();
    let event = state
        .narrative
        .generate_opening(session_id, &body.style, body.include_recap)
        .await?;
    Ok(Json(event))
}

async fn choose(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(body): Json<ChoiceRequest>,
) -> Result<Json<StoryEvent>, ApiError> {
    let session_id = SessionId::parse(&session_id).map_err(|_| ApiError::invalid_id("session"))?;
    let event_id = EventId::parse(&body.event_id).map_err(|_| ApiError::invalid_id("event"))?;
    let event = state
        .narrative
        .branch_story(session_id, event_id, body.choice_index)
        .await?;
    Ok(Json(event))
}

async fn story_feed(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Query(query): Query<StoryFeedQuery>,
) -> Result<Json<StoryFeedResponse>, ApiError> {
    let session_id = SessionId::parse(&session_id).map_err(|_| ApiError::invalid_id("session"))?;
    let mut conn = state.store.acquire().await?;
    state
        .store
        .sessions()
        .get(&mut conn, session_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Session not found"))?;

    let events = state
        .store
        .events()
        .list_for_session(&mut conn, session_id, query.skip.max(0), query.limit.clamp(1, 200))
        .await?;
    let total = state.store.events().count_for_session(&mut conn, session_id).await?;
    Ok(Json(StoryFeedResponse {
        session_id,
        events,
        total,
    }))
}

async fn recap(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<RecapSummary>, ApiError> {
    let session_id = SessionId::parse(&session_id).map_err(|_| ApiError::invalid_id("session"))?;
    let summary = state.narrative.generate_recap(session_id).await?;
    Ok(Json(summary))
}

async fn get_event(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<String>,
) -> Result<Json<StoryEvent>, ApiError> {
    let event_id = EventId::parse(&event_id).map_err(|_| ApiError::invalid_id("event"))?;
    let mut conn = state.store.acquire().await?;
    let event = state
        .store
        .events()
        .get(&mut conn, event_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Event not found"))?;
    Ok(Json(event))
}
