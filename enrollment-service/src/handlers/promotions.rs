use axum::{extract::State, http::StatusCode, Json};
use service_core::error::AppError;
use validator::Validate;

use crate::dtos::{
    BulkPromoteRequest, BulkPromotionResponse, BulkRetainRequest, PromoteRequest,
    PromotionResponse,
};
use crate::services::PromotionInput;
use crate::startup::AppState;

#[tracing::instrument(skip(state, payload), fields(student = %payload.student_id))]
pub async fn promote_student(
    State(state): State<AppState>,
    Json(payload): Json<PromoteRequest>,
) -> Result<(StatusCode, Json<PromotionResponse>), AppError> {
    payload.validate()?;
    let outcome = state.promotions.promote(payload.into()).await?;
    Ok((StatusCode::CREATED, Json(PromotionResponse::from(&outcome))))
}

/// Per-student failures come back in `errors`; the rest commit together.
#[tracing::instrument(skip(state, payload))]
pub async fn bulk_promote(
    State(state): State<AppState>,
    Json(payload): Json<BulkPromoteRequest>,
) -> Result<Json<BulkPromotionResponse>, AppError> {
    payload.validate()?;
    let inputs: Vec<PromotionInput> = payload.students.into_iter().map(Into::into).collect();
    let outcome = state.promotions.bulk_promote(inputs).await?;
    Ok(Json(BulkPromotionResponse::from(&outcome)))
}

#[tracing::instrument(skip(state, payload))]
pub async fn bulk_retain(
    State(state): State<AppState>,
    Json(payload): Json<BulkRetainRequest>,
) -> Result<Json<BulkPromotionResponse>, AppError> {
    payload.validate()?;
    let inputs: Vec<PromotionInput> = payload.students.into_iter().map(Into::into).collect();
    let outcome = state.promotions.bulk_retain(inputs).await?;
    Ok(Json(BulkPromotionResponse::from(&outcome)))
}
