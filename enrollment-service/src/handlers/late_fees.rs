use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use service_core::error::AppError;
use validator::Validate;

use super::parse_id;
use crate::dtos::{
    fee_list, CustomizeLateFeeRequest, CustomizeStudentLateFeesRequest, FeeResponse,
    LateFeeRunResponse, LateFeeSettingsResponse, UpdateSettingsRequest,
};
use crate::startup::AppState;

/// Daily batch, called by an external scheduler. Safe to repeat within a day.
#[tracing::instrument(skip(state))]
pub async fn apply_late_fees(
    State(state): State<AppState>,
) -> Result<Json<LateFeeRunResponse>, AppError> {
    let run = state.late_fees.apply_daily_late_fees(Utc::now()).await?;
    Ok(Json(LateFeeRunResponse::from(&run)))
}

#[tracing::instrument(skip(state, payload))]
pub async fn customize_fee(
    State(state): State<AppState>,
    Path(fee_id): Path<String>,
    Json(payload): Json<CustomizeLateFeeRequest>,
) -> Result<Json<FeeResponse>, AppError> {
    payload.validate()?;
    let fee_id = parse_id(&fee_id, "fee id")?;
    let fee = state
        .late_fees
        .customize_late_fee(fee_id, payload.into())
        .await?;
    Ok(Json(FeeResponse::from(&fee)))
}

#[tracing::instrument(skip(state, payload))]
pub async fn customize_student(
    State(state): State<AppState>,
    Path(student): Path<String>,
    Json(payload): Json<CustomizeStudentLateFeesRequest>,
) -> Result<Json<Vec<FeeResponse>>, AppError> {
    payload.validate()?;
    let student = state.students.get(&student).await?;
    let (period, input) = payload.into_parts();
    let fees = state
        .late_fees
        .customize_student_late_fees(student.id, period, input)
        .await?;
    Ok(Json(fee_list(&fees)))
}

pub async fn get_settings(
    State(state): State<AppState>,
) -> Result<Json<LateFeeSettingsResponse>, AppError> {
    let settings = state.late_fees.load_settings().await?;
    Ok(Json(LateFeeSettingsResponse::from(&settings)))
}

#[tracing::instrument(skip(state, payload))]
pub async fn update_settings(
    State(state): State<AppState>,
    Json(payload): Json<UpdateSettingsRequest>,
) -> Result<Json<LateFeeSettingsResponse>, AppError> {
    payload.validate()?;
    let settings = state.late_fees.save_settings(payload.into()).await?;
    Ok(Json(LateFeeSettingsResponse::from(&settings)))
}
