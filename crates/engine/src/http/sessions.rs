//! Game session routes.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use lorekeeper_domain::{CampaignId, GameSession, SessionId, SessionStatus};

use crate::services::RecapSummary;

use super::{ApiError, AppState};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/campaigns/{campaign_id}/sessions",
            get(list_sessions).post(create_session),
        )
        .route(
            "/api/sessions/{session_id}",
            get(get_session).put(update_session),
        )
        .route("/api/sessions/{session_id}/end", post(end_session))
}

#[derive(Debug, Default, Deserialize)]
struct CreateSessionRequest {
    notes: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpdateSessionRequest {
    status: Option<String>,
    notes: Option<String>,
    recap: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct EndSessionRequest {
    #[serde(default)]
    generate_recap: bool,
}

#[derive(Debug, Serialize)]
struct EndSessionResponse {
    #[serde(flatten)]
    session: GameSession,
    recap_summary: Option<RecapSummary>,
}

async fn create_session(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<String>,
    body: Option<Json<CreateSessionRequest>>,
) -> Result<(StatusCode, Json<GameSession>), ApiError> {
    let campaign_id =
        CampaignId::parse(&campaign_id).map_err(|_| ApiError::invalid_id("campaign"))?;
    let mut conn = state.store.acquire().await?;
    state
        .store
        .campaigns()
        .get(&mut conn, campaign_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Campaign not found"))?;

    let session_number = state
        .store
        .sessions()
        .next_session_number(&mut conn, campaign_id)
        .await?;
    let mut session = GameSession::new(campaign_id, session_number, chrono::Utc::now());
    session.notes = body.and_then(|Json(body)| body.notes);

    state.store.sessions().save(&mut conn, &session).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

async fn list_sessions(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<String>,
) -> Result<Json<Vec<GameSession>>, ApiError> {
    let campaign_id =
        CampaignId::parse(&campaign_id).map_err(|_| ApiError::invalid_id("campaign"))?;
    let mut conn = state.store.acquire().await?;
    let sessions = state
        .store
        .sessions()
        .list_for_campaign(&mut conn, campaign_id)
        .await?;
    Ok(Json(sessions))
}

async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<GameSession>, ApiError> {
    let session_id = SessionId::parse(&session_id).map_err(|_| ApiError::invalid_id("session"))?;
    let mut conn = state.store.acquire().await?;
    let session = state
        .store
        .sessions()
        .get(&mut conn, session_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Session not found"))?;
    Ok(Json(session))
}

async fn update_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(body): Json<UpdateSessionRequest>,
) -> Result<Json<GameSession>, ApiError> {
    let session_id = SessionId::parse(&session_id).map_err(|_| ApiError::invalid_id("session"))?;
    let mut conn = state.store.acquire().await?;
    let mut session = state
        .store
        .sessions()
        .get(&mut conn, session_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Session not found"))?;

    if let Some(status) = body.status {
        session.status = status
            .parse::<SessionStatus>()
            .map_err(ApiError::bad_request)?;
        if session.status != SessionStatus::Active && session.ended_at.is_none() {
            session.ended_at = Some(chrono::Utc::now());
        }
    }
    if body.notes.is_some() {
        session.notes = body.notes;
    }
    if body.recap.is_some() {
        session.recap = body.recap;
    }

    state.store.sessions().save(&mut conn, &session).await?;
    Ok(Json(session))
}

async fn end_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    body: Option<Json<EndSessionRequest>>,
) -> Result<Json<EndSessionResponse>, ApiError> {
    let session_id = SessionId::parse(&session_id).map_err(|_| ApiError::invalid_id("session"))?;
    let generate_recap = body.map(|Json(body)| body.generate_recap).unwrap_or_default();

    {
        let mut conn = state.store.acquire().await?;
        let session = state
            .store
            .sessions()
            .get(&mut conn, session_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Session not found"))?;
        if session.status != SessionStatus::Active {
            return Err(ApiError::bad_request("session is not active"));
        }
    }

    // Generate the recap before closing the session (it reads the event
    // log and writes session.recap).
    let recap_summary = if generate_recap {
        Some(state.narrative.generate_recap(session_id).await?)
    } else {
        None
    };

    let mut conn = state.store.acquire().await?;
    let mut session = state
        .store
        .sessions()
        .get(&mut conn, session_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Session not found"))?;
    session.status = SessionStatus::Completed;
    session.ended_at = Some(chrono::Utc::now());
    state.store.sessions().save(&mut conn, &session).await?;

    Ok(Json(EndSessionResponse {
        session,
        recap_summary,
    }))
}
