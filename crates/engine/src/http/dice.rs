//! Dice routes. Thin wrappers over the deterministic dice resolver using
//! the process-wide RNG.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use validator::Validate;

use lorekeeper_domain::value_objects::dice;
use lorekeeper_domain::DiceRoll;

use super::{validation_error, ApiError, AppState};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/dice/roll", post(roll))
        .route("/api/dice/skill-check", post(skill_check))
        .route("/api/dice/saving-throw", post(saving_throw))
        .route("/api/dice/attack", post(attack))
        .route("/api/dice/initiative", post(initiative))
        .route("/api/dice/stats", post(stats))
}

#[derive(Debug, Deserialize, Validate)]
struct RollRequest {
    #[validate(length(min = 1))]
    notation: String,
    #[serde(default)]
    advantage: bool,
    #[serde(default)]
    disadvantage: bool,
}

#[derive(Debug, Deserialize, Validate)]
struct CheckRequest {
    #[validate(range(min = 1, max = 30))]
    dc: i32,
    #[serde(default)]
    modifier: i32,
    #[serde(default)]
    advantage: bool,
    #[serde(default)]
    disadvantage: bool,
}

#[derive(Debug, Deserialize, Validate)]
struct AttackRequest {
    #[validate(range(min = 1, max = 30))]
    target_ac: i32,
    #[serde(default)]
    modifier: i32,
    #[serde(default)]
    advantage: bool,
    #[serde(default)]
    disadvantage: bool,
    damage_dice: Option<String>,
}

#[derive(Debug, Serialize)]
struct AttackResponse {
    attack_roll: DiceRoll,
    hit: bool,
    critical_hit: bool,
    critical_miss: bool,
    damage: Option<DiceRoll>,
}

#[derive(Debug, Default, Deserialize)]
struct InitiativeRequest {
    #[serde(default)]
    dexterity_modifier: i32,
}

#[derive(Debug, Serialize)]
struct StatsResponse {
    stats: Vec<(String, i32)>,
    total: i32,
}

async fn roll(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RollRequest>,
) -> Result<Json<DiceRoll>, ApiError> {
    body.validate().map_err(validation_error)?;
    let result = state
        .rng
        .with(|rng| {
            if body.advantage && !body.disadvantage {
                dice::roll_with_advantage(rng, &body.notation)
            } else if body.disadvantage && !body.advantage {
                dice::roll_with_disadvantage(rng, &body.notation)
            } else {
                dice::roll(rng, &body.notation)
            }
        })
        .map_err(|err| ApiError::bad_request(err.to_string()))?;
    Ok(Json(result))
}

async fn skill_check(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CheckRequest>,
) -> Result<Json<DiceRoll>, ApiError> {
    body.validate().map_err(validation_error)?;
    let result = state
        .rng
        .with(|rng| {
            dice::skill_check(rng, body.dc, body.modifier, body.advantage, body.disadvantage)
        })
        .map_err(|err| ApiError::bad_request(err.to_string()))?;
    Ok(Json(result))
}

async fn saving_throw(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CheckRequest>,
) -> Result<Json<DiceRoll>, ApiError> {
    body.validate().map_err(validation_error)?;
    let result = state
        .rng
        .with(|rng| {
            dice::saving_throw(rng, body.dc, body.modifier, body.advantage, body.disadvantage)
        })
        .map_err(|err| ApiError::bad_request(err.to_string()))?;
    Ok(Json(result))
}

async fn attack(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AttackRequest>,
) -> Result<Json<AttackResponse>, ApiError> {
    body.validate().map_err(validation_error)?;
    let attack_roll = state
        .rng
        .with(|rng| {
            dice::attack_roll(
                rng,
                body.target_ac,
                body.modifier,
                body.advantage,
                body.disadvantage,
            )
        })
        .map_err(|err| ApiError::bad_request(err.to_string()))?;

    let hit = attack_roll.success.unwrap_or(false);
    let critical_hit = attack_roll.critical == Some(lorekeeper_domain::value_objects::dice::Critical::Hit);
    let critical_miss =
        attack_roll.critical == Some(lorekeeper_domain::value_objects::dice::Critical::Fail);

    let damage = match (&body.damage_dice, hit) {
        (Some(notation), true) => Some(
            state
                .rng
                .with(|rng| dice::roll_damage(rng, notation, critical_hit))
                .map_err(|err| ApiError::bad_request(err.to_string()))?,
        ),
        _ => None,
    };

    Ok(Json(AttackResponse {
        attack_roll,
        hit,
        critical_hit,
        critical_miss,
        damage,
    }))
}

async fn initiative(
    State(state): State<Arc<AppState>>,
    body: Option<Json<InitiativeRequest>>,
) -> Result<Json<DiceRoll>, ApiError> {
    let body = body.map(|Json(body)| body).unwrap_or_default();
    let result = state
        .rng
        .with(|rng| dice::roll_initiative(rng, body.dexterity_modifier))
        .map_err(|err| ApiError::bad_request(err.to_string()))?;
    Ok(Json(result))
}

async fn stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let rolled = state.rng.with(|rng| dice::roll_stats(rng));
    let total = rolled.iter().map(|(_, score)| score).sum();
    Json(StatsResponse {
        stats: rolled
            .into_iter()
            .map(|(name, score)| (name.to_string(), score))
            .collect(),
        total,
    })
}
