use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use super::Enrollment;

/// A person enrolled at the institution.
///
/// `fees`, `payments` and `receipts` are denormalized id lists maintained by
/// the orchestrators inside the same transaction that creates the documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Student {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    /// Human-readable id, e.g. `CII2505001`.
    pub student_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub father_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mother_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guardian_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mobile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guardian_mobile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default)]
    pub class_ids: Vec<ObjectId>,
    pub class_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roll_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_enrollment: Option<ObjectId>,
    #[serde(default)]
    pub advance_balance: f64,
    #[serde(default)]
    pub fees: Vec<ObjectId>,
    #[serde(default)]
    pub payments: Vec<ObjectId>,
    #[serde(default)]
    pub receipts: Vec<ObjectId>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Student {
    /// Make `enrollment` the current one and copy its placement, or clear the
    /// placement when there is none left.
    pub fn place_in(&mut self, enrollment: Option<&Enrollment>) {
        match enrollment {
            Some(e) => {
                self.class_ids = e.class_ids.clone();
                self.class_name = e.class_name.clone();
                self.section = e.section.clone();
                self.roll_number = e.roll_number.clone();
                self.current_enrollment = Some(e.id);
            }
            None => {
                self.class_ids.clear();
                self.class_name.clear();
                self.section = None;
                self.roll_number = None;
                self.current_enrollment = None;
            }
        }
    }

    /// Number used to look the student up when no student id is supplied.
    pub fn contact_number(&self) -> Option<&str> {
        self.mobile
            .as_deref()
            .or(self.guardian_mobile.as_deref())
    }
}
