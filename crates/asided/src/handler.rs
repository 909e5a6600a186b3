//! HTTP handlers for the product service

use std::sync::Arc;

use asidecache::{AsideCache, Error, StatsSnapshot};
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use recordstore::{Record, RecordId};
use tracing::error;

/// Build the service routes
pub fn router(cache: Arc<AsideCache>) -> Router {
    Router::new()
        .route("/product/{id}", get(get_product).put(update_product))
        .route("/stats", get(get_stats))
        .with_state(cache)
}

/// Request failure mapped onto a status code and a plain-text body
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound,
    Internal,
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::NotFound(_) => ApiError::NotFound,
            Error::Validation(msg) => ApiError::BadRequest(msg),
            Error::Store(e) => {
                error!(error = %e, "Store request failed");
                ApiError::Internal
            }
            Error::Config(msg) => {
                error!(error = %msg, "Misconfigured cache");
                ApiError::Internal
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "Product not found").into_response(),
            ApiError::Internal => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            }
        }
    }
}

fn parse_id(raw: &str) -> Result<RecordId, ApiError> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ApiError::BadRequest("Invalid product id".to_string()));
    }
    raw.parse()
        .map_err(|_| ApiError::BadRequest("Invalid product id".to_string()))
}

async fn get_product(
    State(cache): State<Arc<AsideCache>>,
    Path(raw_id): Path<String>,
) -> Result<Json<Record>, ApiError> {
    let id = parse_id(&raw_id)?;
    let record = cache.fetch(id).await?;
    Ok(Json(record))
}

async fn update_product(
    State(cache): State<Arc<AsideCache>>,
    Path(raw_id): Path<String>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&raw_id)?;
    let record: Record = serde_json::from_slice(&body)
        .map_err(|_| ApiError::BadRequest("Invalid JSON".to_string()))?;

    cache.update(id, record).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_stats(State(cache): State<Arc<AsideCache>>) -> Json<StatsSnapshot> {
    Json(cache.stats().snapshot())
}
