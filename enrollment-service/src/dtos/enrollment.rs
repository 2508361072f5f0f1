use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

use super::class_ref::{class_selection, lenient_date, lenient_f64};
use super::responses::{
    fee_list, EnrollmentResponse, FeeResponse, PaymentResponse, ReceiptResponse, StudentResponse,
};
use crate::models::EnrollmentStatus;
use crate::services::enrollment::{DeletionSummary, EnrollmentWrite};
use crate::services::fees::FeeLine;
use crate::services::{AdmissionInput, EnrollmentChanges, StudentDetails};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct FeeLineRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "Fee type is required"))]
    pub fee_type: String,

    #[serde(default, deserialize_with = "lenient_f64")]
    #[validate(range(min = 0.0, message = "Amount cannot be negative"))]
    pub amount: f64,

    #[serde(default, deserialize_with = "lenient_f64")]
    #[validate(range(min = 0.0, message = "Discount cannot be negative"))]
    pub discount: f64,

    #[serde(default, deserialize_with = "lenient_f64")]
    #[validate(range(min = 0.0, message = "Waiver cannot be negative"))]
    pub waiver: f64,

    #[serde(default, alias = "advance", alias = "paid_amount", deserialize_with = "lenient_f64")]
    #[validate(range(min = 0.0, message = "Advance amount cannot be negative"))]
    pub advance_amount: f64,

    #[serde(default, deserialize_with = "lenient_date")]
    pub due_date: Option<DateTime<Utc>>,
}

impl From<FeeLineRequest> for FeeLine {
    fn from(r: FeeLineRequest) -> Self {
        FeeLine {
            fee_type: r.fee_type.trim().to_string(),
            amount: r.amount,
            discount: r.discount,
            waiver: r.waiver,
            advance: r.advance_amount,
            due_date: r.due_date,
        }
    }
}

/// Admission payload. Class may be given in any of the shapes accepted by
/// [`class_selection`].
#[derive(Debug, Deserialize, Validate)]
pub struct CreateEnrollmentRequest {
    #[serde(default)]
    pub student_id: Option<String>,

    #[serde(default, alias = "name")]
    #[validate(length(min = 1, message = "Student name is required"))]
    pub student_name: String,

    #[serde(default)]
    pub father_name: Option<String>,
    #[serde(default)]
    pub mother_name: Option<String>,
    #[serde(default)]
    pub guardian_name: Option<String>,
    #[serde(default)]
    pub mobile: Option<String>,
    #[serde(default)]
    pub guardian_mobile: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub department: Option<String>,

    #[serde(default, alias = "class_id", alias = "class_ids", alias = "classes")]
    pub class: Value,
    #[serde(default)]
    pub class_name: Option<String>,

    #[serde(default)]
    pub section: Option<String>,
    #[serde(default)]
    pub roll_number: Option<String>,
    #[serde(default)]
    pub session: Option<String>,

    #[serde(default)]
    #[validate(nested)]
    pub fees: Vec<FeeLineRequest>,

    #[serde(default)]
    pub payment_method: Option<String>,
}

impl From<CreateEnrollmentRequest> for AdmissionInput {
    fn from(r: CreateEnrollmentRequest) -> Self {
        AdmissionInput {
            student: StudentDetails {
                student_id: r.student_id,
                name: r.student_name,
                father_name: r.father_name,
                mother_name: r.mother_name,
                guardian_name: r.guardian_name,
                mobile: r.mobile,
                guardian_mobile: r.guardian_mobile,
                address: r.address,
                department: r.department,
            },
            classes: class_selection(&r.class),
            class_name: r.class_name,
            section: r.section,
            roll_number: r.roll_number,
            session: r.session,
            fees: r.fees.into_iter().map(FeeLine::from).collect(),
            payment_method: r.payment_method,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateEnrollmentRequest {
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default)]
    pub roll_number: Option<String>,
    #[serde(default)]
    pub session: Option<String>,
    #[serde(default)]
    pub status: Option<EnrollmentStatus>,
    #[serde(default, alias = "class_id", alias = "class_ids", alias = "classes")]
    pub class: Option<Value>,
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,
    /// Replaces all billing of the enrollment when present.
    #[serde(default)]
    #[validate(nested)]
    pub fees: Option<Vec<FeeLineRequest>>,
}

impl From<UpdateEnrollmentRequest> for EnrollmentChanges {
    fn from(r: UpdateEnrollmentRequest) -> Self {
        EnrollmentChanges {
            section: r.section,
            roll_number: r.roll_number,
            session: r.session,
            status: r.status,
            classes: r.class.as_ref().map(class_selection),
            class_name: r.class_name,
            payment_method: r.payment_method,
            fees: r
                .fees
                .map(|lines| lines.into_iter().map(FeeLine::from).collect()),
        }
    }
}

/// Structured result of admission and enrollment update.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EnrollmentWriteResponse {
    pub student: StudentResponse,
    pub enrollment: EnrollmentResponse,
    pub fees: Vec<FeeResponse>,
    pub payment: Option<PaymentResponse>,
    pub receipt: Option<ReceiptResponse>,
}

impl From<&EnrollmentWrite> for EnrollmentWriteResponse {
    fn from(w: &EnrollmentWrite) -> Self {
        Self {
            student: (&w.student).into(),
            enrollment: (&w.enrollment).into(),
            fees: fee_list(&w.fees),
            payment: w.payment.as_ref().map(Into::into),
            receipt: w.receipt.as_ref().map(Into::into),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EnrollmentDetailResponse {
    pub enrollment: EnrollmentResponse,
    pub fees: Vec<FeeResponse>,
}

#[derive(Debug, Serialize)]
pub struct DeletionResponse {
    pub enrollment: String,
    pub fees_deleted: usize,
    pub payments_deleted: usize,
    pub receipts_deleted: usize,
}

impl From<DeletionSummary> for DeletionResponse {
    fn from(s: DeletionSummary) -> Self {
        Self {
            enrollment: s.enrollment.to_hex(),
            fees_deleted: s.fees_deleted,
            payments_deleted: s.payments_deleted,
            receipts_deleted: s.receipts_deleted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ClassRef;
    use serde_json::json;

    #[test]
    fn loose_admission_payload_is_normalized() {
        let request: CreateEnrollmentRequest = serde_json::from_value(json!({
            "name": "Abdur Rahman",
            "guardian_mobile": "01711111111",
            "class": { "label": "Class 5" },
            "fees": [
                { "fee_type": "Tuition Fee", "amount": "1000", "advance": 400 }
            ]
        }))
        .unwrap();
        assert!(request.validate().is_ok());

        let input = AdmissionInput::from(request);
        assert_eq!(input.student.name, "Abdur Rahman");
        assert_eq!(input.classes.refs, vec![ClassRef::Name("Class 5".to_string())]);
        assert_eq!(input.fees[0].amount, 1000.0);
        assert_eq!(input.fees[0].advance, 400.0);
    }

    #[test]
    fn missing_name_and_negative_amount_fail_validation() {
        let request: CreateEnrollmentRequest = serde_json::from_value(json!({
            "fees": [{ "fee_type": "Exam Fee", "amount": -10 }]
        }))
        .unwrap();
        let errors = request.validate().unwrap_err();
        let text = errors.to_string();
        assert!(text.contains("student_name"));
        assert!(text.contains("fees"));
    }

    #[test]
    fn update_without_fees_keeps_billing() {
        let request: UpdateEnrollmentRequest =
            serde_json::from_value(json!({ "section": "B", "status": "left" })).unwrap();
        let changes = EnrollmentChanges::from(request);
        assert!(changes.fees.is_none());
        assert!(changes.classes.is_none());
        assert_eq!(changes.status, Some(EnrollmentStatus::Left));
    }

    #[test]
    fn failed_response_omits_data() {
        let body = serde_json::to_value(ApiResponse::<()>::failed("Enrollment not found")).unwrap();
        assert_eq!(body, json!({ "success": false, "message": "Enrollment not found" }));
    }
}
