pub mod class;
pub mod enrollment;
pub mod fee;
pub mod payment;
pub mod receipt;
pub mod settings;
pub mod student;

pub use class::{class_code, ClassRef, ClassSelection, FeeStructureItem, SchoolClass};
pub use enrollment::{AdmissionType, Enrollment, EnrollmentStatus, PaymentStatus};
pub use fee::{Fee, FeeStatus, LateFeeCustomization};
pub use payment::{Payment, PaymentRecordStatus};
pub use receipt::{InstituteSnapshot, Receipt, ReceiptItem, ReceiptSummary, StudentSnapshot};
pub use settings::{LateFeeRun, LateFeeSettings, RunItemError, LATE_FEE_SETTINGS_ID};
pub use student::Student;

// Helper module for optional DateTime<Utc> as BSON DateTime
pub(crate) mod opt_chrono_datetime_as_bson_datetime {
    use chrono::{DateTime, Utc};
    use mongodb::bson;
    use serde::{self, Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(date: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match date {
            Some(dt) => {
                let bson_dt = bson::DateTime::from_chrono(*dt);
                bson_dt.serialize(serializer)
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt: Option<bson::DateTime> = Option::deserialize(deserializer)?;
        Ok(opt.map(|dt| dt.to_chrono()))
    }
}
