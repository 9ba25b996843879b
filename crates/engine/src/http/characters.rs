//! Character routes: PC creation, AI NPC generation, CRUD, and dialogue.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use validator::Validate;

use lorekeeper_domain::{
    AbilityScores, CampaignId, Character, CharacterId, CharacterKind, LocationId,
};

use crate::services::DialogueResult;

use super::{validation_error, ApiError, AppState};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/campaigns/{campaign_id}/characters",
            get(list_characters).post(create_character),
        )
        .route("/api/campaigns/{campaign_id}/npcs", post(create_npc))
        .route(
            "/api/characters/{character_id}",
            get(get_character).put(update_character).delete(delete_character),
        )
        .route("/api/characters/{character_id}/dialogue", post(dialogue))
}

#[derive(Debug, Deserialize, Validate)]
struct CreateCharacterRequest {
    #[validate(length(min = 1, max = 255))]
    name: String,
    race: Option<String>,
    char_class: Option<String>,
    #[serde(default = "default_level")]
    #[validate(range(min = 1, max = 20))]
    level: i32,
    #[serde(default = "default_hp")]
    #[validate(range(min = 1))]
    hp_max: i32,
    #[serde(default = "default_ac")]
    armor_class: i32,
    abilities: Option<AbilityScores>,
    #[serde(default)]
    personality_traits: Vec<String>,
    backstory: Option<String>,
    appearance: Option<String>,
    current_location_id: Option<String>,
}

fn default_level() -> i32 {
    1
}

fn default_hp() -> i32 {
    10
}

fn default_ac() -> i32 {
    10
}

#[derive(Debug, Default, Deserialize)]
struct CreateNpcRequest {
    role: Option<String>,
    location_id: Option<String>,
    #[serde(default)]
    personality_hints: Vec<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpdateCharacterRequest {
    name: Option<String>,
    race: Option<String>,
    char_class: Option<String>,
    level: Option<i32>,
    hp_current: Option<i32>,
    hp_max: Option<i32>,
    armor_class: Option<i32>,
    abilities: Option<AbilityScores>,
    personality_traits: Option<Vec<String>>,
    backstory: Option<String>,
    appearance: Option<String>,
    is_alive: Option<bool>,
    conditions: Option<Vec<String>>,
    gold: Option<i32>,
    current_location_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListCharactersQuery {
    character_type: Option<String>,
    #[serde(default)]
    alive_only: bool,
}

#[derive(Debug, Deserialize, Validate)]
struct DialogueRequest {
    #[validate(length(min = 1))]
    message: String,
    context: Option<String>,
}

async fn create_character(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<String>,
    Json(body): Json<CreateCharacterRequest>,
) -> Result<(StatusCode, Json<Character>), ApiError> {
    body.validate().map_err(validation_error)?;
    let campaign_id =
        CampaignId::parse(&campaign_id).map_err(|_| ApiError::invalid_id("campaign"))?;

    let mut conn = state.store.acquire().await?;
    state
        .store
        .campaigns()
        .get(&mut conn, campaign_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Campaign not found"))?;

    let abilities = body.abilities.unwrap_or_default();
    if !abilities.is_valid() {
        return Err(ApiError::bad_request("ability scores must be within 1-30"));
    }

    let mut character = Character::new(campaign_id, body.name, CharacterKind::Pc, chrono::Utc::now());
    character.race = body.race;
    character.char_class = body.char_class;
    character.level = body.level;
    character.hp_max = body.hp_max;
    character.hp_current = body.hp_max;
    character.armor_class = body.armor_class;
    character.abilities = abilities;
    character.personality_traits = body.personality_traits;
    character.backstory = body.backstory;
    character.appearance = body.appearance;
    character.current_location_id = body
        .current_location_id
        .map(|raw| LocationId::parse(&raw))
        .transpose()
        .map_err(|_| ApiError::invalid_id("location"))?;

    state.store.characters().save(&mut conn, &character).await?;
    Ok((StatusCode::CREATED, Json(character)))
}

async fn create_npc(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<String>,
    body: Option<Json<CreateNpcRequest>>,
) -> Result<(StatusCode, Json<Character>), ApiError> {
    let campaign_id =
        CampaignId::parse(&campaign_id).map_err(|_| ApiError::invalid_id("campaign"))?;
    let body = body.map(|Json(body)| body).unwrap_or_default();
    let location_id = body
        .location_id
        .map(|raw| LocationId::parse(&raw))
        .transpose()
        .map_err(|_| ApiError::invalid_id("location"))?;

    let npc = state
        .npc
        .generate_npc(
            campaign_id,
            body.role.as_deref(),
            location_id,
            &body.personality_hints,
            body.name.as_deref(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(npc)))
}

async fn list_characters(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<String>,
    Query(query): Query<ListCharactersQuery>,
) -> Result<Json<Vec<Character>>, ApiError> {
    let campaign_id =
        CampaignId::parse(&campaign_id).map_err(|_| ApiError::invalid_id("campaign"))?;
    let kind = query
        .character_type
        .map(|raw| raw.parse::<CharacterKind>())
        .transpose()
        .map_err(ApiError::bad_request)?;

    let mut conn = state.store.acquire().await?;
    let characters = state
        .store
        .characters()
        .list(&mut conn, campaign_id, kind, query.alive_only)
        .await?;
    Ok(Json(characters))
}

async fn get_character(
    State(state): State<Arc<AppState>>,
    Path(character_id): Path<String>,
) -> Result<Json<Character>, ApiError> {
    let character_id =
        CharacterId::parse(&character_id).map_err(|_| ApiError::invalid_id("character"))?;
    let mut conn = state.store.acquire().await?;
    let character = state
        .store
        .characters()
        .get(&mut conn, character_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Character not found"))?;
    Ok(Json(character))
}

async fn update_character(
    State(state): State<Arc<AppState>>,
    Path(character_id): Path<String>,
    Json(body): Json<UpdateCharacterRequest>,
) -> Result<Json<Character>, ApiError> {
    let character_id =
        CharacterId::parse(&character_id).map_err(|_| ApiError::invalid_id("character"))?;
    let mut conn = state.store.acquire().await?;
    let mut character = state
        .store
        .characters()
        .get(&mut conn, character_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Character not found"))?;

    if let Some(name) = body.name {
        if name.is_empty() {
            return Err(ApiError::bad_request("name must not be empty"));
        }
        character.name = name;
    }
    if body.race.is_some() {
        character.race = body.race;
    }
    if body.char_class.is_some() {
        character.char_class = body.char_class;
    }
    if let Some(level) = body.level {
        if !(1..=20).contains(&level) {
            return Err(ApiError::bad_request("level must be within 1-20"));
        }
        character.level = level;
    }
    if let Some(hp_max) = body.hp_max {
        if hp_max < 1 {
            return Err(ApiError::bad_request("hp_max must be positive"));
        }
        character.hp_max = hp_max;
    }
    if let Some(hp_current) = body.hp_current {
        character.hp_current = hp_current.clamp(0, character.hp_max);
    }
    character.hp_current = character.hp_current.min(character.hp_max);
    if let Some(armor_class) = body.armor_class {
        character.armor_class = armor_class;
    }
    if let Some(abilities) = body.abilities {
        if !abilities.is_valid() {
            return Err(ApiError::bad_request("ability scores must be within 1-30"));
        }
        character.abilities = abilities;
    }
    if let Some(traits) = body.personality_traits {
        character.personality_traits = traits;
    }
    if body.backstory.is_some() {
        character.backstory = body.backstory;
    }
    if body.appearance.is_some() {
        character.appearance = body.appearance;
    }
    if let Some(is_alive) = body.is_alive {
        character.is_alive = is_alive;
    }
    if let Some(conditions) = body.conditions {
        character.conditions = conditions;
    }
    if let Some(gold) = body.gold {
        character.gold = gold;
    }
    if let Some(raw) = body.current_location_id {
        character.current_location_id =
            Some(LocationId::parse(&raw).map_err(|_| ApiError::invalid_id("location"))?);
    }
    character.updated_at = chrono::Utc::now();

    state.store.characters().save(&mut conn, &character).await?;
    Ok(Json(character))
}

async fn delete_character(
    State(state): State<Arc<AppState>>,
    Path(character_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let character_id =
        CharacterId::parse(&character_id).map_err(|_| ApiError::invalid_id("character"))?;
    let mut conn = state.store.acquire().await?;
    let deleted = state.store.characters().delete(&mut conn, character_id).await?;
    if !deleted {
        return Err(ApiError::not_found("Character not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn dialogue(
    State(state): State<Arc<AppState>>,
    Path(character_id): Path<String>,
    Json(body): Json<DialogueRequest>,
) -> Result<Json<DialogueResult>, ApiError> {
    body.validate().map_err(validation_error)?;
    let character_id =
        CharacterId::parse(&character_id).map_err(|_| ApiError::invalid_id("character"))?;
    let result = state
        .npc
        .generate_dialogue(character_id, &body.message, body.context.as_deref())
        .await?;
    Ok(Json(result))
}
