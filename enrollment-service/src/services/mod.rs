pub mod classes;
pub mod database;
pub mod enrollment;
pub mod error;
pub mod fees;
pub mod late_fee;
pub mod late_fee_calculator;
pub mod metrics;
pub mod promotion;
pub mod receipts;
pub mod student_ids;
pub mod students;
pub mod transaction;

pub use classes::{ClassService, NewClass};
pub use database::SchoolDb;
pub use enrollment::{AdmissionInput, EnrollmentChanges, EnrollmentService, StudentDetails};
pub use error::ServiceError;
pub use late_fee::{FeePeriod, LateFeeOverride, LateFeeService};
pub use metrics::{get_metrics, init_metrics};
pub use promotion::{PromotionInput, PromotionService};
pub use students::StudentService;
