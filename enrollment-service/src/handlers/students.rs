use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use service_core::error::AppError;

use crate::dtos::{fee_list, FeeResponse, HistoryResponse, StudentResponse};
use crate::services::fees::round_money;
use crate::startup::AppState;

#[derive(Debug, Serialize)]
pub struct LedgerResponse {
    pub student: StudentResponse,
    pub fees: Vec<FeeResponse>,
    pub total_due: f64,
}

#[tracing::instrument(skip(state))]
pub async fn enrollment_history(
    State(state): State<AppState>,
    Path(student): Path<String>,
) -> Result<Json<HistoryResponse>, AppError> {
    let (student, enrollments) = state.students.enrollments(&student).await?;
    Ok(Json(HistoryResponse::new(&student, &enrollments)))
}

#[tracing::instrument(skip(state))]
pub async fn fee_ledger(
    State(state): State<AppState>,
    Path(student): Path<String>,
) -> Result<Json<LedgerResponse>, AppError> {
    let (student, fees) = state.students.fees(&student).await?;
    let total_due = fees
        .iter()
        .filter(|f| !f.is_late_fee_record)
        .map(|f| f.due_amount)
        .sum::<f64>();
    Ok(Json(LedgerResponse {
        student: (&student).into(),
        fees: fee_list(&fees),
        total_due: round_money(total_due),
    }))
}
