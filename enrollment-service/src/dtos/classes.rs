use serde::Deserialize;
use validator::Validate;

use crate::models::FeeStructureItem;
use crate::services::NewClass;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateClassRequest {
    #[validate(length(min = 1, message = "Class name is required"))]
    pub name: String,
    /// Two-digit code used in student ids.
    #[serde(default)]
    #[validate(length(max = 2, message = "Class code must be at most two characters"))]
    pub code: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub fee_structure: Vec<FeeStructureItem>,
}

impl From<CreateClassRequest> for NewClass {
    fn from(r: CreateClassRequest) -> Self {
        NewClass {
            name: r.name,
            code: r.code,
            department: r.department,
            fee_structure: r.fee_structure,
        }
    }
}
