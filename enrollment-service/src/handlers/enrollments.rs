//! Admission and enrollment maintenance.
//!
//! Create and update answer with `{success, message, data}` in every case so
//! the admission form can show the message as-is.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use validator::Validate;

use super::parse_id;
use crate::dtos::{
    fee_list, ApiResponse, CreateEnrollmentRequest, DeletionResponse, EnrollmentDetailResponse,
    EnrollmentWriteResponse, UpdateEnrollmentRequest,
};
use crate::services::ServiceError;
use crate::startup::AppState;

type Outcome = (StatusCode, Json<ApiResponse<EnrollmentWriteResponse>>);

fn failure(status: StatusCode, message: impl Into<String>) -> Outcome {
    (status, Json(ApiResponse::failed(message)))
}

fn service_failure(err: ServiceError) -> Outcome {
    let err = err.normalize();
    let message = match &err {
        ServiceError::Database(_) | ServiceError::Serialization(_) | ServiceError::Internal(_) => {
            tracing::error!(error = %err, "Enrollment write failed");
            "Failed to save enrollment".to_string()
        }
        other => other.to_string(),
    };
    failure(AppError::from(err).status_code(), message)
}

fn rejection(err: JsonRejection) -> Outcome {
    failure(StatusCode::BAD_REQUEST, format!("Invalid request body: {}", err.body_text()))
}

#[tracing::instrument(skip(state, payload))]
pub async fn create_enrollment(
    State(state): State<AppState>,
    payload: Result<Json<CreateEnrollmentRequest>, JsonRejection>,
) -> Outcome {
    let Json(request) = match payload {
        Ok(body) => body,
        Err(e) => return rejection(e),
    };
    if let Err(e) = request.validate() {
        return failure(StatusCode::BAD_REQUEST, format!("Validation error: {}", e));
    }

    match state.enrollments.create(request.into()).await {
        Ok(write) => (
            StatusCode::CREATED,
            Json(ApiResponse::ok(
                "Enrollment created successfully",
                EnrollmentWriteResponse::from(&write),
            )),
        ),
        Err(e) => service_failure(e),
    }
}

#[tracing::instrument(skip(state, payload))]
pub async fn update_enrollment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateEnrollmentRequest>, JsonRejection>,
) -> Outcome {
    let id = match parse_id(&id, "enrollment id") {
        Ok(id) => id,
        Err(e) => return failure(StatusCode::BAD_REQUEST, e.to_string()),
    };
    let Json(request) = match payload {
        Ok(body) => body,
        Err(e) => return rejection(e),
    };
    if let Err(e) = request.validate() {
        return failure(StatusCode::BAD_REQUEST, format!("Validation error: {}", e));
    }

    match state.enrollments.update(id, request.into()).await {
        Ok(write) => (
            StatusCode::OK,
            Json(ApiResponse::ok(
                "Enrollment updated successfully",
                EnrollmentWriteResponse::from(&write),
            )),
        ),
        Err(e) => service_failure(e),
    }
}

#[tracing::instrument(skip(state))]
pub async fn get_enrollment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<EnrollmentDetailResponse>, AppError> {
    let id = parse_id(&id, "enrollment id")?;
    let (enrollment, fees) = state.enrollments.get(id).await?;
    Ok(Json(EnrollmentDetailResponse {
        enrollment: (&enrollment).into(),
        fees: fee_list(&fees),
    }))
}

#[tracing::instrument(skip(state))]
pub async fn delete_enrollment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeletionResponse>, AppError> {
    let id = parse_id(&id, "enrollment id")?;
    let summary = state.enrollments.delete(id).await?;
    Ok(Json(summary.into()))
}
