//! Persisted late-fee configuration and batch run records.

use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

pub const LATE_FEE_SETTINGS_ID: &str = "late_fee";

/// Late-fee policy, stored as a single document in `settings`.
///
/// Loaded at the start of every batch run and passed down explicitly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LateFeeSettings {
    #[serde(rename = "_id")]
    pub id: String,
    pub enabled: bool,
    /// Penalty per day late, in taka.
    pub per_day_rate: f64,
    /// Cap as a percentage of the fee's original amount.
    pub max_percentage: f64,
    pub grace_period_days: i64,
    /// Fee types the batch applies to (case-insensitive substring match).
    /// Empty means every fee type.
    #[serde(default)]
    pub applicable_fee_types: Vec<String>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Default for LateFeeSettings {
    fn default() -> Self {
        Self {
            id: LATE_FEE_SETTINGS_ID.to_string(),
            enabled: true,
            per_day_rate: 10.0,
            max_percentage: 50.0,
            grace_period_days: 0,
            applicable_fee_types: Vec::new(),
            updated_at: Utc::now(),
        }
    }
}

impl LateFeeSettings {
    pub fn applies_to(&self, fee_type: &str) -> bool {
        if self.applicable_fee_types.is_empty() {
            return true;
        }
        let fee_type = fee_type.to_lowercase();
        self.applicable_fee_types
            .iter()
            .any(|t| fee_type.contains(&t.to_lowercase()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunItemError {
    pub fee: ObjectId,
    pub message: String,
}

/// Summary of one late-fee batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LateFeeRun {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub processed: u32,
    pub updated: u32,
    pub skipped: u32,
    pub records_created: u32,
    pub records_updated: u32,
    #[serde(default)]
    pub errors: Vec<RunItemError>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub started_at: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub finished_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_fee_type_list_applies_everywhere() {
        let settings = LateFeeSettings::default();
        assert!(settings.applies_to("Tuition Fee"));
        assert!(settings.applies_to("Exam Fee"));
    }

    #[test]
    fn fee_type_filter_is_case_insensitive() {
        let settings = LateFeeSettings {
            applicable_fee_types: vec!["monthly".to_string()],
            ..LateFeeSettings::default()
        };
        assert!(settings.applies_to("Monthly Fee"));
        assert!(!settings.applies_to("Admission Fee"));
    }
}
