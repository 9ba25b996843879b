//! HTTP entry points: axum routers per resource plus the error mapping.

mod campaigns;
mod characters;
mod dice;
mod encounters;
mod knowledge;
mod locations;
mod narrative;
mod sessions;
mod state;

pub use state::AppState;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::EngineError;
use crate::store::StoreError;

/// API error wrapper. Maps engine errors to status codes:
/// 400 invalid input / state violation / graph invariant, 404 missing,
/// 409 lock contention, 503 generator exhaustion, 500 everything else.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, detail)
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, detail)
    }

    pub fn invalid_id(what: &str) -> Self {
        Self::bad_request(format!("invalid {what} id"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, detail = %self.detail, "request failed");
        }
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        let status = match &err {
            EngineError::InvalidInput(_)
            | EngineError::StateViolation(_)
            | EngineError::Graph(_) => StatusCode::BAD_REQUEST,
            EngineError::NotFound { .. } => StatusCode::NOT_FOUND,
            EngineError::Conflict(_) => StatusCode::CONFLICT,
            EngineError::GeneratorUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            EngineError::Store(StoreError::NotFound) => StatusCode::NOT_FOUND,
            EngineError::Generator(_) | EngineError::Prompt(_) | EngineError::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, err.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self::from(EngineError::from(err))
    }
}

/// Map validator output to one readable 400 detail line.
pub(crate) fn validation_error(errors: validator::ValidationErrors) -> ApiError {
    ApiError::bad_request(errors.to_string().replace('\n', "; "))
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "name": "Lorekeeper",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "AI-powered Dungeon Master for tabletop RPGs",
    }))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}

/// Assemble the full application router.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = if state.config.cors_origins.is_empty() {
        CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
    } else {
        let origins: Vec<axum::http::HeaderValue> = state
            .config
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .merge(campaigns::routes())
        .merge(sessions::routes())
        .merge(characters::routes())
        .merge(narrative::routes())
        .merge(encounters::routes())
        .merge(locations::routes())
        .merge(knowledge::routes())
        .merge(dice::routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
