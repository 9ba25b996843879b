//! Encounter routes: creation, actions, balance, loot, resolution.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::Value;

use lorekeeper_domain::{Difficulty, Encounter, EncounterId, EncounterType, LocationId, SessionId};

use crate::services::{ActionOutcome, BalanceReport, ResolutionSummary};

use super::{ApiError, AppState};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/sessions/{session_id}/encounters", post(create_encounter))
        .route("/api/encounters/{encounter_id}", get(get_encounter))
        .route("/api/encounters/{encounter_id}/action", post(resolve_action))
        .route("/api/encounters/{encounter_id}/balance", get(balance))
        .route("/api/encounters/{encounter_id}/resolve", post(resolve_encounter))
        .route("/api/encounters/{encounter_id}/loot", get(loot))
}

#[derive(Debug, Default, Deserialize)]
struct CreateEncounterRequest {
    encounter_type: Option<String>,
    difficulty: Option<String>,
    location_id: Option<String>,
    theme: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DiceResultInput {
    total: i32,
}

#[derive(Debug, Deserialize)]
struct EncounterActionRequest {
    character_id: String,
    action_type: String,
    target_id: Option<String>,
    dice_result: Option<DiceResultInput>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResolveEncounterRequest {
    outcome: String,
    #[serde(default = "default_distribute")]
    distribute_rewards: bool,
}

fn default_distribute() -> bool {
    true
}

async fn create_encounter(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    body: Option<Json<CreateEncounterRequest>>,
) -> Result<(StatusCode, Json<Encounter>), ApiError> {
    let session_id = SessionId::parse(&session_id).map_err(|_| ApiError::invalid_id("session"))?;
    let body = body.map(|Json(body)| body).unwrap_or_default();

    let encounter_type = body
        .encounter_type
        .as_deref()
        .unwrap_or("combat")
        .parse::<EncounterType>()
        .map_err(ApiError::bad_request)?;
    let difficulty = body
        .difficulty
        .as_deref()
        .unwrap_or("medium")
        .parse::<Difficulty>()
        .map_err(ApiError::bad_request)?;
    let location_id = body
        .location_id
        .map(|raw| LocationId::parse(&raw))
        .transpose()
        .map_err(|_| ApiError::invalid_id("location"))?;

    let encounter = state
        .encounters
        .generate_encounter(
            session_id,
            encounter_type,
            difficulty,
            location_id,
            body.theme.as_deref(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(encounter)))
}

async fn get_encounter(
    State(state): State<Arc<AppState>>,
    Path(encounter_id): Path<String>,
) -> Result<Json<Encounter>, ApiError> {
    let encounter_id =
        EncounterId::parse(&encounter_id).map_err(|_| ApiError::invalid_id("encounter"))?;
    let mut conn = state.store.acquire().await?;
    let encounter = state
        .store
        .encounters()
        .get(&mut conn, encounter_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Encounter not found"))?;
    Ok(Json(encounter))
}

async fn resolve_action(
    State(state): State<Arc<AppState>>,
    Path(encounter_id): Path<String>,
    Json(body): Json<EncounterActionRequest>,
) -> Result<Json<ActionOutcome>, ApiError> {
    let encounter_id =
        EncounterId::parse(&encounter_id).map_err(|_| ApiError::invalid_id("encounter"))?;
    let outcome = state
        .encounters
        .resolve_action(
            encounter_id,
            &body.character_id,
            &body.action_type,
            body.target_id.as_deref(),
            body.dice_result.map(|input| input.total),
            body.description.as_deref(),
        )
        .await?;
    Ok(Json(outcome))
}

async fn balance(
    State(state): State<Arc<AppState>>,
    Path(encounter_id): Path<String>,
) -> Result<Json<BalanceReport>, ApiError> {
    let encounter_id =
        EncounterId::parse(&encounter_id).map_err(|_| ApiError::invalid_id("encounter"))?;
    let report = state.encounters.balance_encounter(encounter_id).await?;
    Ok(Json(report))
}

async fn resolve_encounter(
    State(state): State<Arc<AppState>>,
    Path(encounter_id): Path<String>,
    Json(body): Json<ResolveEncounterRequest>,
) -> Result<Json<ResolutionSummary>, ApiError> {
    let encounter_id =
        EncounterId::parse(&encounter_id).map_err(|_| ApiError::invalid_id("encounter"))?;
    let summary = state
        .encounters
        .resolve_encounter(encounter_id, &body.outcome, body.distribute_rewards)
        .await?;
    Ok(Json(summary))
}

async fn loot(
    State(state): State<Arc<AppState>>,
    Path(encounter_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let encounter_id =
        EncounterId::parse(&encounter_id).map_err(|_| ApiError::invalid_id("encounter"))?;
    let rewards = state.encounters.generate_loot(encounter_id).await?;
    Ok(Json(rewards))
}
