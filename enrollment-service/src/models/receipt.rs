use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StudentSnapshot {
    pub student_id: String,
    pub name: String,
    pub class_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roll_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mobile: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstituteSnapshot {
    pub name: String,
    pub address: String,
    pub phone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReceiptItem {
    pub fee: ObjectId,
    pub fee_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub month: Option<String>,
    pub amount: f64,
    pub discount: f64,
    pub paid: f64,
    pub due: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReceiptSummary {
    pub total_amount: f64,
    pub total_discount: f64,
    /// Always equal to the payment's `total_amount`.
    pub amount_paid: f64,
    /// Part of `amount_paid` credited to the student's advance balance.
    pub advance_credit: f64,
    pub due_amount: f64,
}

/// Immutable printable snapshot of a payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub receipt_no: String,
    pub payment: ObjectId,
    pub student: ObjectId,
    pub student_snapshot: StudentSnapshot,
    pub items: Vec<ReceiptItem>,
    pub summary: ReceiptSummary,
    pub institute: InstituteSnapshot,
    pub payment_method: String,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}
