use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

/// One line of a class's fee structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeeStructureItem {
    pub fee_type: String,
    pub amount: f64,
    #[serde(default)]
    pub is_monthly: bool,
}

/// A grade/level definition. Referenced by enrollments, never cascaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchoolClass {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub name: String,
    /// Two-digit code embedded in generated student ids.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default)]
    pub fee_structure: Vec<FeeStructureItem>,
    #[serde(default)]
    pub sections: Vec<ObjectId>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl SchoolClass {
    /// Class code used in student ids: the explicit code, else the digits of
    /// the class name ("Class 5" -> "05"), else "00".
    pub fn id_code(&self) -> String {
        class_code(self.code.as_deref(), &self.name)
    }
}

/// A class as named by a client: an id to resolve, or free text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassRef {
    Id(ObjectId),
    Name(String),
}

/// Normalized class selection of one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassSelection {
    pub refs: Vec<ClassRef>,
}

impl ClassSelection {
    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    pub fn ids(&self) -> Vec<ObjectId> {
        self.refs
            .iter()
            .filter_map(|r| match r {
                ClassRef::Id(id) => Some(*id),
                ClassRef::Name(_) => None,
            })
            .collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.refs
            .iter()
            .filter_map(|r| match r {
                ClassRef::Name(name) => Some(name.as_str()),
                ClassRef::Id(_) => None,
            })
            .collect()
    }
}

pub fn class_code(code: Option<&str>, name: &str) -> String {
    let source = code
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(name);
    let digits: String = source.chars().filter(|c| c.is_ascii_digit()).collect();
    match digits.len() {
        0 => "00".to_string(),
        1 => format!("0{}", digits),
        _ => digits[digits.len() - 2..].to_string(),
    }
}
