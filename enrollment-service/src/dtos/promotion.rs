use serde::{Deserialize, Serialize};
use validator::Validate;

use super::responses::{fee_list, EnrollmentResponse, FeeResponse, StudentResponse};
use crate::models::{Enrollment, Student};
use crate::services::promotion::{BulkOutcome, PromotionOutcome};
use crate::services::PromotionInput;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PromoteRequest {
    /// ObjectId hex or the generated student id.
    #[validate(length(min = 1, message = "Student is required"))]
    pub student_id: String,
    #[serde(alias = "class_id")]
    #[validate(length(min = 1, message = "Target class is required"))]
    pub new_class_id: String,
    #[serde(default)]
    pub roll_number: Option<String>,
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default)]
    pub session: Option<String>,
}

impl From<PromoteRequest> for PromotionInput {
    fn from(r: PromoteRequest) -> Self {
        PromotionInput {
            student: r.student_id,
            class_id: Some(r.new_class_id),
            roll_number: r.roll_number,
            section: r.section,
            session: r.session,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct BulkPromoteRequest {
    #[serde(alias = "promotions")]
    #[validate(length(min = 1, message = "At least one student is required"))]
    #[validate(nested)]
    pub students: Vec<PromoteRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RetainRequest {
    #[validate(length(min = 1, message = "Student is required"))]
    pub student_id: String,
    #[serde(default)]
    pub roll_number: Option<String>,
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default)]
    pub session: Option<String>,
}

impl From<RetainRequest> for PromotionInput {
    fn from(r: RetainRequest) -> Self {
        PromotionInput {
            student: r.student_id,
            class_id: None,
            roll_number: r.roll_number,
            section: r.section,
            session: r.session,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct BulkRetainRequest {
    #[validate(length(min = 1, message = "At least one student is required"))]
    #[validate(nested)]
    pub students: Vec<RetainRequest>,
}

#[derive(Debug, Serialize)]
pub struct PromotionResponse {
    pub student: StudentResponse,
    pub previous_enrollment: EnrollmentResponse,
    pub enrollment: EnrollmentResponse,
    pub fees: Vec<FeeResponse>,
}

impl From<&PromotionOutcome> for PromotionResponse {
    fn from(o: &PromotionOutcome) -> Self {
        Self {
            student: (&o.student).into(),
            previous_enrollment: (&o.previous).into(),
            enrollment: (&o.enrollment).into(),
            fees: fee_list(&o.fees),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BulkErrorResponse {
    pub student_id: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct BulkPromotionResponse {
    pub successful: Vec<PromotionResponse>,
    pub errors: Vec<BulkErrorResponse>,
}

impl From<&BulkOutcome> for BulkPromotionResponse {
    fn from(o: &BulkOutcome) -> Self {
        Self {
            successful: o.successful.iter().map(Into::into).collect(),
            errors: o
                .errors
                .iter()
                .map(|e| BulkErrorResponse {
                    student_id: e.student.clone(),
                    message: e.message.clone(),
                })
                .collect(),
        }
    }
}

/// A student's enrollments, newest first.
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub student: StudentResponse,
    pub enrollments: Vec<EnrollmentResponse>,
}

impl HistoryResponse {
    pub fn new(student: &Student, enrollments: &[Enrollment]) -> Self {
        Self {
            student: student.into(),
            enrollments: enrollments.iter().map(Into::into).collect(),
        }
    }
}
