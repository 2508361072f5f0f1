use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentRecordStatus {
    Completed,
    Cancelled,
}

impl PaymentRecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentRecordStatus::Completed => "completed",
            PaymentRecordStatus::Cancelled => "cancelled",
        }
    }
}

/// One collection transaction against one or more fees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub receipt_no: String,
    pub student: ObjectId,
    pub enrollment: ObjectId,
    #[serde(default)]
    pub fees: Vec<ObjectId>,
    pub total_amount: f64,
    pub payment_method: String,
    pub status: PaymentRecordStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}
