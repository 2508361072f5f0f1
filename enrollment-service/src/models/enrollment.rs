use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrollmentStatus {
    Active,
    Passed,
    Failed,
    Left,
}

impl EnrollmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrollmentStatus::Active => "active",
            EnrollmentStatus::Passed => "passed",
            EnrollmentStatus::Failed => "failed",
            EnrollmentStatus::Left => "left",
        }
    }
}

impl std::fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdmissionType {
    Admission,
    Promotion,
}

impl AdmissionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdmissionType::Admission => "admission",
            AdmissionType::Promotion => "promotion",
        }
    }
}

/// Enrollment-level payment state derived from the fee totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Partial,
    Paid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Partial => "partial",
            PaymentStatus::Paid => "paid",
        }
    }
}

/// A student's registration in one class for one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Enrollment {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub student: ObjectId,
    pub student_name: String,
    #[serde(default)]
    pub class_ids: Vec<ObjectId>,
    pub class_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roll_number: Option<String>,
    pub session: String,
    pub status: EnrollmentStatus,
    pub admission_type: AdmissionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promoted_from: Option<ObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promoted_to: Option<ObjectId>,
    #[serde(default)]
    pub fees: Vec<ObjectId>,
    pub total_amount: f64,
    pub paid_amount: f64,
    pub due_amount: f64,
    pub payment_status: PaymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}
