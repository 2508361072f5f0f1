use chrono::Utc;
use serde::Deserialize;
use validator::Validate;

use super::class_ref::lenient_f64;
use crate::models::{LateFeeSettings, LATE_FEE_SETTINGS_ID};
use crate::services::{FeePeriod, LateFeeOverride};

#[derive(Debug, Deserialize, Validate)]
pub struct CustomizeLateFeeRequest {
    #[serde(deserialize_with = "lenient_f64")]
    #[validate(range(min = 0.0, message = "Late fee cannot be negative"))]
    pub amount: f64,
    #[validate(length(min = 1, message = "A reason is required"))]
    pub reason: String,
    #[serde(default)]
    pub customized_by: Option<String>,
}

impl From<CustomizeLateFeeRequest> for LateFeeOverride {
    fn from(r: CustomizeLateFeeRequest) -> Self {
        LateFeeOverride {
            amount: r.amount,
            reason: r.reason.trim().to_string(),
            customized_by: r.customized_by,
        }
    }
}

/// Bulk override for one student, optionally limited to a month and year.
#[derive(Debug, Deserialize, Validate)]
pub struct CustomizeStudentLateFeesRequest {
    #[serde(flatten)]
    #[validate(nested)]
    pub late_fee: CustomizeLateFeeRequest,
    #[serde(default)]
    pub month: Option<String>,
    #[serde(default)]
    #[validate(range(min = 2000, max = 2100, message = "Invalid year"))]
    pub year: Option<i32>,
}

impl CustomizeStudentLateFeesRequest {
    pub fn into_parts(self) -> (FeePeriod, LateFeeOverride) {
        let period = FeePeriod {
            month: self.month.map(|m| m.trim().to_string()).filter(|m| !m.is_empty()),
            year: self.year,
        };
        (period, self.late_fee.into())
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateSettingsRequest {
    pub enabled: bool,
    #[validate(range(min = 0.0, message = "per_day_rate cannot be negative"))]
    pub per_day_rate: f64,
    #[validate(range(min = 0.0, max = 100.0, message = "max_percentage must be between 0 and 100"))]
    pub max_percentage: f64,
    #[serde(default)]
    #[validate(range(min = 0, message = "grace_period_days cannot be negative"))]
    pub grace_period_days: i64,
    #[serde(default)]
    pub applicable_fee_types: Vec<String>,
}

impl From<UpdateSettingsRequest> for LateFeeSettings {
    fn from(r: UpdateSettingsRequest) -> Self {
        LateFeeSettings {
            id: LATE_FEE_SETTINGS_ID.to_string(),
            enabled: r.enabled,
            per_day_rate: r.per_day_rate,
            max_percentage: r.max_percentage,
            grace_period_days: r.grace_period_days,
            applicable_fee_types: r
                .applicable_fee_types
                .into_iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
            updated_at: Utc::now(),
        }
    }
}
