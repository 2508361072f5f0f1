use mongodb::{
    bson::{doc, oid::ObjectId, Document},
    ClientSession,
};

use super::database::{find_all_unscoped, SchoolDb};
use super::error::ServiceError;
use crate::models::{Enrollment, Fee, Student};

/// Filter for a student given either its ObjectId hex or its student id.
pub fn student_filter(key: &str) -> Document {
    let key = key.trim();
    match ObjectId::parse_str(key) {
        Ok(id) => doc! { "_id": id },
        Err(_) => doc! { "student_id": key },
    }
}

pub async fn find_student(
    db: &SchoolDb,
    key: &str,
    session: &mut ClientSession,
) -> Result<Student, ServiceError> {
    db.students()
        .find_one_with_session(student_filter(key), None, session)
        .await?
        .ok_or_else(|| ServiceError::not_found(format!("Student {} not found", key.trim())))
}

/// Read-side queries about a single student.
#[derive(Clone)]
pub struct StudentService {
    db: SchoolDb,
}

impl StudentService {
    pub fn new(db: SchoolDb) -> Self {
        Self { db }
    }

    pub async fn get(&self, key: &str) -> Result<Student, ServiceError> {
        self.db
            .students()
            .find_one(student_filter(key), None)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("Student {} not found", key.trim())))
    }

    /// Enrollment history, newest first.
    pub async fn enrollments(&self, key: &str) -> Result<(Student, Vec<Enrollment>), ServiceError> {
        let student = self.get(key).await?;
        let enrollments = find_all_unscoped(
            &self.db.enrollments(),
            doc! { "student": student.id },
            Some(doc! { "created_at": -1 }),
        )
        .await?;
        Ok((student, enrollments))
    }

    /// Fee ledger ordered by due date.
    pub async fn fees(&self, key: &str) -> Result<(Student, Vec<Fee>), ServiceError> {
        let student = self.get(key).await?;
        let fees = find_all_unscoped(
            &self.db.fees(),
            doc! { "student": student.id },
            Some(doc! { "due_date": 1, "fee_type": 1 }),
        )
        .await?;
        Ok((student, fees))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_id_keys_match_primary_key() {
        let id = ObjectId::new();
        assert_eq!(student_filter(&id.to_hex()), doc! { "_id": id });
    }

    #[test]
    fn other_keys_match_student_id() {
        assert_eq!(
            student_filter(" CII2505001 "),
            doc! { "student_id": "CII2505001" }
        );
    }
}
