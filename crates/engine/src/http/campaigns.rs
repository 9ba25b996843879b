//! Campaign CRUD routes.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use validator::Validate;

use lorekeeper_domain::{Campaign, CampaignId, Genre, Tone};

use super::{validation_error, ApiError, AppState};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/campaigns", get(list_campaigns).post(create_campaign))
        .route(
            "/api/campaigns/{campaign_id}",
            get(get_campaign).put(update_campaign).delete(delete_campaign),
        )
}

#[derive(Debug, Deserialize, Validate)]
struct CreateCampaignRequest {
    #[validate(length(min = 1, max = 255))]
    name: String,
    description: Option<String>,
    #[serde(default = "default_genre")]
    genre: String,
    #[serde(default = "default_tone")]
    tone: String,
    setting_description: Option<String>,
    #[serde(default)]
    world_rules: BTreeMap<String, String>,
}

fn default_genre() -> String {
    "fantasy".to_string()
}

fn default_tone() -> String {
    "serious".to_string()
}

#[derive(Debug, Deserialize)]
struct UpdateCampaignRequest {
    name: Option<String>,
    description: Option<String>,
    genre: Option<String>,
    tone: Option<String>,
    setting_description: Option<String>,
    world_rules: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(default)]
    skip: i64,
    #[serde(default = "default_limit")]
    limit: i64,
}

fn default_limit() -> i64 {
    100
}

#[derive(Debug, Serialize)]
struct CampaignListItem {
    #[serde(flatten)]
    campaign: Campaign,
    session_count: i64,
    character_count: i64,
    location_count: i64,
}

async fn create_campaign(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateCampaignRequest>,
) -> Result<(StatusCode, Json<Campaign>), ApiError> {
    body.validate().map_err(validation_error)?;
    let genre: Genre = body.genre.parse().map_err(ApiError::bad_request)?;
    let tone: Tone = body.tone.parse().map_err(ApiError::bad_request)?;

    let mut campaign = Campaign::new(body.name, genre, tone, chrono::Utc::now());
    campaign.description = body.description;
    campaign.setting_description = body.setting_description;
    campaign.world_rules = body.world_rules;

    let mut conn = state.store.acquire().await?;
    state.store.campaigns().save(&mut conn, &campaign).await?;
    Ok((StatusCode::CREATED, Json(campaign)))
}

async fn list_campaigns(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<CampaignListItem>>, ApiError> {
    let mut conn = state.store.acquire().await?;
    let campaigns = state
        .store
        .campaigns()
        .list(&mut conn, query.skip.max(0), query.limit.clamp(1, 500))
        .await?;

    let mut items = Vec::with_capacity(campaigns.len());
    for campaign in campaigns {
        let counts = state.store.campaigns().counts(&mut conn, campaign.id).await?;
        items.push(CampaignListItem {
            campaign,
            session_count: counts.sessions,
            character_count: counts.characters,
            location_count: counts.locations,
        });
    }
    Ok(Json(items))
}

async fn get_campaign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<String>,
) -> Result<Json<Campaign>, ApiError> {
    let campaign_id =
        CampaignId::parse(&campaign_id).map_err(|_| ApiError::invalid_id("campaign"))?;
    let mut conn = state.store.acquire().await?;
    let campaign = state
        .store
        .campaigns()
        .get(&mut conn, campaign_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Campaign not found"))?;
    Ok(Json(campaign))
}

async fn update_campaign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<String>,
    Json(body): Json<UpdateCampaignRequest>,
) -> Result<Json<Campaign>, ApiError> {
    let campaign_id =
        CampaignId::parse(&campaign_id).map_err(|_| ApiError::invalid_id("campaign"))?;
    let mut conn = state.store.acquire().await?;
    let mut campaign = state
        .store
        .campaigns()
        .get(&mut conn, campaign_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Campaign not found"))?;

    if let Some(name) = body.name {
        if name.is_empty() {
            return Err(ApiError::bad_request("name must not be empty"));
        }
        campaign.name = name;
    }
    if let Some(genre) = body.genre {
        campaign.genre = genre.parse().map_err(ApiError::bad_request)?;
    }
    if let Some(tone) = body.tone {
        campaign.tone = tone.parse().map_err(ApiError::bad_request)?;
    }
    if body.description.is_some() {
        campaign.description = body.description;
    }
    if body.setting_description.is_some() {
        campaign.setting_description = body.setting_description;
    }
    if let Some(world_rules) = body.world_rules {
        campaign.world_rules = world_rules;
    }
    campaign.updated_at = chrono::Utc::now();

    state.store.campaigns().save(&mut conn, &campaign).await?;
    Ok(Json(campaign))
}

async fn delete_campaign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let campaign_id =
        CampaignId::parse(&campaign_id).map_err(|_| ApiError::invalid_id("campaign"))?;
    let mut conn = state.store.acquire().await?;
    let deleted = state.store.campaigns().delete(&mut conn, campaign_id).await?;
    if !deleted {
        return Err(ApiError::not_found("Campaign not found"));
    }
    // Drop the cached graph so a recreated campaign starts clean.
    state.registry.evict(campaign_id);
    Ok(StatusCode::NO_CONTENT)
}
