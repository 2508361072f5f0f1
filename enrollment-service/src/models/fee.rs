use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use super::opt_chrono_datetime_as_bson_datetime;
use crate::services::fees::{base_due, fee_status};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeeStatus {
    Unpaid,
    Partial,
    Paid,
}

impl FeeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeeStatus::Unpaid => "unpaid",
            FeeStatus::Partial => "partial",
            FeeStatus::Paid => "paid",
        }
    }

    /// Statuses the late-fee batch and bulk overrides operate on.
    pub fn outstanding() -> [&'static str; 2] {
        [FeeStatus::Unpaid.as_str(), FeeStatus::Partial.as_str()]
    }
}

/// One staff override of a fee's late fee. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LateFeeCustomization {
    pub previous_amount: f64,
    pub new_amount: f64,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customized_by: Option<String>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub customized_at: DateTime<Utc>,
}

/// A single billable charge tied to one enrollment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fee {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub student: ObjectId,
    pub enrollment: ObjectId,
    pub class_name: String,
    pub fee_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub month: Option<String>,
    pub year: i32,
    pub amount: f64,
    #[serde(default)]
    pub discount: f64,
    #[serde(default)]
    pub waiver: f64,
    #[serde(default)]
    pub paid_amount: f64,
    pub due_amount: f64,
    pub status: FeeStatus,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub due_date: DateTime<Utc>,
    #[serde(default)]
    pub is_monthly: bool,
    /// Per-fee rate overriding the configured per-day rate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub late_fee_per_day: Option<f64>,
    #[serde(default)]
    pub late_fee_amount: f64,
    #[serde(default)]
    pub late_fee_days: i64,
    #[serde(default)]
    pub late_fee_applied: bool,
    #[serde(default)]
    pub late_fee_customized: bool,
    #[serde(default)]
    pub late_fee_customizations: Vec<LateFeeCustomization>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "opt_chrono_datetime_as_bson_datetime"
    )]
    pub last_late_fee_calculation: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_late_fee_record: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_fee: Option<ObjectId>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Fee {
    /// Outstanding amount ignoring any late fee.
    pub fn base_due(&self) -> f64 {
        base_due(self.amount, self.paid_amount, self.discount, self.waiver)
    }

    /// Re-derive `due_amount` and `status` from the monetary fields.
    ///
    /// The late fee is only carried into `due_amount` while the base charge
    /// is still outstanding.
    pub fn refresh_totals(&mut self) {
        let base = self.base_due();
        self.status = fee_status(base, self.paid_amount);
        self.due_amount = if base > 0.0 {
            base + self.late_fee_amount
        } else {
            base
        };
    }

    pub fn is_outstanding(&self) -> bool {
        matches!(self.status, FeeStatus::Unpaid | FeeStatus::Partial)
    }
}
