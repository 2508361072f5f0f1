pub mod class_ref;
pub mod classes;
pub mod enrollment;
pub mod late_fee;
pub mod promotion;
pub mod responses;

pub use classes::CreateClassRequest;
pub use enrollment::{
    ApiResponse, CreateEnrollmentRequest, DeletionResponse, EnrollmentDetailResponse,
    EnrollmentWriteResponse, UpdateEnrollmentRequest,
};
pub use late_fee::{CustomizeLateFeeRequest, CustomizeStudentLateFeesRequest, UpdateSettingsRequest};
pub use promotion::{
    BulkPromoteRequest, BulkPromotionResponse, BulkRetainRequest, HistoryResponse,
    PromoteRequest, PromotionResponse,
};
pub use responses::*;
