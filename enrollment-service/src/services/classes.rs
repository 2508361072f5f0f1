use chrono::Utc;
use mongodb::{
    bson::{doc, oid::ObjectId},
    ClientSession,
};

use super::database::{find_all, SchoolDb};
use super::error::ServiceError;
use crate::models::{class_code, ClassSelection, FeeStructureItem, SchoolClass};

/// Class data an enrollment is written with.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedClass {
    pub ids: Vec<ObjectId>,
    pub name: String,
    /// Two-digit code for student ids.
    pub code: String,
}

/// Display name for an enrollment whose class could not be identified.
pub fn placeholder_class_name(department: Option<&str>) -> String {
    match department.map(str::trim).filter(|d| !d.is_empty()) {
        Some(department) => format!("{} Class", department),
        None => "General Class".to_string(),
    }
}

/// Combine the classes found in the database with the request's free text.
///
/// Resolved classes win; otherwise free-text names, then `fallback_name`,
/// then the department placeholder.
pub fn merge_resolution(
    found: &[SchoolClass],
    selection: &ClassSelection,
    fallback_name: Option<&str>,
    department: Option<&str>,
) -> ResolvedClass {
    if let Some(first) = found.first() {
        return ResolvedClass {
            ids: found.iter().map(|c| c.id).collect(),
            name: found
                .iter()
                .map(|c| c.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            code: first.id_code(),
        };
    }

    let names: Vec<&str> = selection
        .names()
        .into_iter()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .collect();
    let name = if !names.is_empty() {
        names.join(", ")
    } else {
        fallback_name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| placeholder_class_name(department))
    };

    ResolvedClass {
        ids: Vec::new(),
        code: class_code(None, &name),
        name,
    }
}

/// Resolve a class selection inside the caller's transaction.
pub async fn resolve_classes(
    db: &SchoolDb,
    selection: &ClassSelection,
    fallback_name: Option<&str>,
    department: Option<&str>,
    session: &mut ClientSession,
) -> Result<ResolvedClass, ServiceError> {
    let ids = selection.ids();
    let mut found = Vec::new();
    if !ids.is_empty() {
        found = find_all(&db.classes(), doc! { "_id": { "$in": ids.clone() } }, None, session).await?;
        // Keep the order the client selected them in
        found.sort_by_key(|c| ids.iter().position(|id| *id == c.id));
        if found.len() < ids.len() {
            tracing::warn!(
                requested = ids.len(),
                found = found.len(),
                "Some selected classes do not exist"
            );
        }
    }
    Ok(merge_resolution(&found, selection, fallback_name, department))
}

#[derive(Debug, Clone)]
pub struct NewClass {
    pub name: String,
    pub code: Option<String>,
    pub department: Option<String>,
    pub fee_structure: Vec<FeeStructureItem>,
}

#[derive(Clone)]
pub struct ClassService {
    db: SchoolDb,
}

impl ClassService {
    pub fn new(db: SchoolDb) -> Self {
        Self { db }
    }

    #[tracing::instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create(&self, input: NewClass) -> Result<SchoolClass, ServiceError> {
        if input.fee_structure.iter().any(|f| f.amount < 0.0) {
            return Err(ServiceError::bad_request("Fee amounts cannot be negative"));
        }
        let class = SchoolClass {
            id: ObjectId::new(),
            name: input.name.trim().to_string(),
            code: input.code.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()),
            department: input.department,
            fee_structure: input.fee_structure,
            sections: Vec::new(),
            created_at: Utc::now(),
        };
        self.db.classes().insert_one(&class, None).await?;
        tracing::info!(class_id = %class.id, "Class created");
        Ok(class)
    }

    pub async fn get(&self, id: ObjectId) -> Result<SchoolClass, ServiceError> {
        self.db
            .classes()
            .find_one(doc! { "_id": id }, None)
            .await?
            .ok_or_else(|| ServiceError::not_found("Class not found"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ClassRef;

    fn class(name: &str, code: Option<&str>) -> SchoolClass {
        SchoolClass {
            id: ObjectId::new(),
            name: name.to_string(),
            code: code.map(str::to_string),
            department: None,
            fee_structure: Vec::new(),
            sections: Vec::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn resolved_classes_take_precedence() {
        let five = class("Class 5", None);
        let selection = ClassSelection {
            refs: vec![ClassRef::Id(five.id), ClassRef::Name("ignored".to_string())],
        };
        let resolved = merge_resolution(&[five.clone()], &selection, None, None);
        assert_eq!(resolved.ids, vec![five.id]);
        assert_eq!(resolved.name, "Class 5");
        assert_eq!(resolved.code, "05");
    }

    #[test]
    fn free_text_used_when_nothing_resolves() {
        let selection = ClassSelection {
            refs: vec![ClassRef::Id(ObjectId::new()), ClassRef::Name("Hifz 2".to_string())],
        };
        let resolved = merge_resolution(&[], &selection, None, Some("Hifz"));
        assert!(resolved.ids.is_empty());
        assert_eq!(resolved.name, "Hifz 2");
        assert_eq!(resolved.code, "02");
    }

    #[test]
    fn department_placeholder_as_last_resort() {
        let empty = ClassSelection::default();
        assert_eq!(
            merge_resolution(&[], &empty, None, Some("Kitab")).name,
            "Kitab Class"
        );
        assert_eq!(merge_resolution(&[], &empty, None, None).name, "General Class");
        assert_eq!(
            merge_resolution(&[], &empty, Some("Nazera"), None).name,
            "Nazera"
        );
    }
}
