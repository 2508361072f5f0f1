//! HTTP handlers for enrollment-service.

pub mod classes;
pub mod enrollments;
pub mod late_fees;
pub mod promotions;
pub mod receipts;
pub mod students;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use mongodb::bson::oid::ObjectId;
use serde_json::json;
use service_core::error::AppError;

use crate::services::get_metrics;
use crate::startup::AppState;

pub async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "service": "enrollment-service",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// Ready once MongoDB answers a ping.
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ready" }))),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable" })),
            )
        }
    }
}

pub async fn metrics_endpoint() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        get_metrics(),
    )
}

pub(crate) fn parse_id(raw: &str, label: &str) -> Result<ObjectId, AppError> {
    ObjectId::parse_str(raw)
        .map_err(|_| AppError::BadRequest(anyhow::anyhow!("Invalid {}: {}", label, raw)))
}
