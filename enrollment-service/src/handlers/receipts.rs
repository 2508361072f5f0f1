use axum::{
    extract::{Path, State},
    Json,
};
use service_core::error::AppError;

use crate::dtos::ReceiptResponse;
use crate::services::receipts::find_receipt;
use crate::startup::AppState;

/// Receipt by ObjectId or receipt number.
#[tracing::instrument(skip(state))]
pub async fn get_receipt(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<ReceiptResponse>, AppError> {
    let receipt = find_receipt(&state.db, &key).await?;
    Ok(Json(ReceiptResponse::from(&receipt)))
}
