//! Location routes: generation, listing, connection, discovery, map data.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use validator::Validate;

use lorekeeper_domain::{CampaignId, Location, LocationId};

use crate::services::MapData;

use super::{validation_error, ApiError, AppState};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/campaigns/{campaign_id}/locations",
            get(list_locations).post(create_location),
        )
        .route(
            "/api/campaigns/{campaign_id}/locations/connect",
            post(connect_locations),
        )
        .route("/api/locations/{location_id}", get(get_location))
        .route("/api/locations/{location_id}/discover", post(discover_location))
        .route("/api/campaigns/{campaign_id}/map", get(map_data))
}

#[derive(Debug, Deserialize, Validate)]
struct CreateLocationRequest {
    #[validate(length(min = 1, max = 50))]
    location_type: String,
    theme: Option<String>,
    #[serde(default = "default_danger")]
    #[validate(range(min = 1, max = 10))]
    danger_level: i32,
    parent_location_id: Option<String>,
    name: Option<String>,
}

fn default_danger() -> i32 {
    3
}

#[derive(Debug, Deserialize)]
struct ConnectRequest {
    location_a_id: String,
    location_b_id: String,
    #[serde(default = "default_path_type")]
    path_type: String,
    travel_time: Option<String>,
}

fn default_path_type() -> String {
    "road".to_string()
}

#[derive(Debug, Default, Deserialize)]
struct ListLocationsQuery {
    #[serde(default)]
    discovered_only: bool,
}

#[derive(Debug, Default, Deserialize)]
struct MapQuery {
    #[serde(default)]
    include_undiscovered: bool,
}

async fn create_location(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<String>,
    Json(body): Json<CreateLocationRequest>,
) -> Result<(StatusCode, Json<Location>), ApiError> {
    body.validate().map_err(validation_error)?;
    let campaign_id =
        CampaignId::parse(&campaign_id).map_err(|_| ApiError::invalid_id("campaign"))?;
    let parent_location_id = body
        .parent_location_id
        .map(|raw| LocationId::parse(&raw))
        .transpose()
        .map_err(|_| ApiError::invalid_id("location"))?;

    let location = state
        .map
        .generate_location(
            campaign_id,
            &body.location_type,
            body.theme.as_deref(),
            body.danger_level,
            parent_location_id,
            body.name.as_deref(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(location)))
}

async fn list_locations(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<String>,
    Query(query): Query<ListLocationsQuery>,
) -> Result<Json<Vec<Location>>, ApiError> {
    let campaign_id =
        CampaignId::parse(&campaign_id).map_err(|_| ApiError::invalid_id("campaign"))?;
    let mut conn = state.store.acquire().await?;
    let locations = state
        .store
        .locations()
        .list_for_campaign(&mut conn, campaign_id, query.discovered_only)
        .await?;
    Ok(Json(locations))
}

async fn connect_locations(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<String>,
    Json(body): Json<ConnectRequest>,
) -> Result<StatusCode, ApiError> {
    CampaignId::parse(&campaign_id).map_err(|_| ApiError::invalid_id("campaign"))?;
    let location_a =
        LocationId::parse(&body.location_a_id).map_err(|_| ApiError::invalid_id("location"))?;
    let location_b =
        LocationId::parse(&body.location_b_id).map_err(|_| ApiError::invalid_id("location"))?;
    if location_a == location_b {
        return Err(ApiError::bad_request("cannot connect a location to itself"));
    }

    state
        .map
        .connect_locations(
            location_a,
            location_b,
            &body.path_type,
            body.travel_time.as_deref(),
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_location(
    State(state): State<Arc<AppState>>,
    Path(location_id): Path<String>,
) -> Result<Json<Location>, ApiError> {
    let location_id =
        LocationId::parse(&location_id).map_err(|_| ApiError::invalid_id("location"))?;
    let mut conn = state.store.acquire().await?;
    let location = state
        .store
        .locations()
        .get(&mut conn, location_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Location not found"))?;
    Ok(Json(location))
}

async fn discover_location(
    State(state): State<Arc<AppState>>,
    Path(location_id): Path<String>,
) -> Result<Json<Location>, ApiError> {
    let location_id =
        LocationId::parse(&location_id).map_err(|_| ApiError::invalid_id("location"))?;
    let location = state.map.discover_location(location_id).await?;
    Ok(Json(location))
}

async fn map_data(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<String>,
    Query(query): Query<MapQuery>,
) -> Result<Json<MapData>, ApiError> {
    let campaign_id =
        CampaignId::parse(&campaign_id).map_err(|_| ApiError::invalid_id("campaign"))?;
    let data = state
        .map
        .get_map_data(campaign_id, query.include_undiscovered)
        .await?;
    Ok(Json(data))
}
