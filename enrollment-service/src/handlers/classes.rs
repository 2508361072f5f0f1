use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use validator::Validate;

use super::parse_id;
use crate::dtos::{ClassResponse, CreateClassRequest};
use crate::startup::AppState;

#[tracing::instrument(skip(state, payload), fields(name = %payload.name))]
pub async fn create_class(
    State(state): State<AppState>,
    Json(payload): Json<CreateClassRequest>,
) -> Result<(StatusCode, Json<ClassResponse>), AppError> {
    payload.validate()?;
    let class = state.classes.create(payload.into()).await?;
    Ok((StatusCode::CREATED, Json(ClassResponse::from(&class))))
}

#[tracing::instrument(skip(state))]
pub async fn get_class(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ClassResponse>, AppError> {
    let id = parse_id(&id, "class id")?;
    let class = state.classes.get(id).await?;
    Ok(Json(ClassResponse::from(&class)))
}
