//! HTTP surface: route registration, the three GET handlers, and the
//! request-level error type.

use crate::metrics::{self, MetricsSnapshot};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

/// Request-level failure: a synchronous OS query broke during collection.
/// Sampler timeouts never reach this type; they degrade inside the 200.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("failed to collect metrics")]
    Collection(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let ApiError::Collection(err) = self;
        tracing::error!("metrics collection failed: {err:#}");

        let body = Json(json!({
            "error": "failed_to_collect_metrics",
            "message": format!("{err:#}"),
        }));
        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct Status {
    pub status: &'static str,
    pub time: DateTime<Utc>,
}

/// Build the application router.
pub fn router() -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/status", get(status))
        .route("/api/metrics", get(metrics_snapshot))
}

/// GET /health: liveness probe, no failure path.
async fn health() -> Json<Health> {
    Json(Health { status: "ok" })
}

/// GET /api/status: static status plus the current timestamp.
async fn status() -> Json<Status> {
    Json(Status {
        status: "ok",
        time: Utc::now(),
    })
}

/// GET /api/metrics: one fresh snapshot per request.
async fn metrics_snapshot() -> Result<Json<MetricsSnapshot>, ApiError> {
    let snapshot = metrics::collect().await?;
    Ok(Json(snapshot))
}
