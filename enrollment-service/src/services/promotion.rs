//! Moving students between classes.
//!
//! A promotion closes the student's active enrollment as `passed` and opens
//! a new one in the target class with a fresh year of unpaid fees. A
//! retention does the same in the current class with the prior enrollment
//! marked `failed`.

use chrono::{DateTime, Datelike, Utc};
use mongodb::{
    bson::{doc, oid::ObjectId},
    options::FindOneOptions,
    ClientSession,
};

use super::database::SchoolDb;
use super::error::ServiceError;
use super::fees::{academic_year, EnrollmentTotals, FeeCalculator, FeeContext};
use super::metrics;
use super::students::find_student;
use super::transaction::run_in_transaction;
use crate::config::FeePolicyConfig;
use crate::models::{AdmissionType, Enrollment, EnrollmentStatus, Fee, SchoolClass, Student};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromotionKind {
    Promote,
    Retain,
}

impl PromotionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromotionKind::Promote => "promote",
            PromotionKind::Retain => "retain",
        }
    }

    fn closing_status(&self) -> EnrollmentStatus {
        match self {
            PromotionKind::Promote => EnrollmentStatus::Passed,
            PromotionKind::Retain => EnrollmentStatus::Failed,
        }
    }
}

/// One student to move. `student` is an ObjectId hex or a student id.
#[derive(Debug, Clone, Default)]
pub struct PromotionInput {
    pub student: String,
    /// Target class; ignored for retention.
    pub class_id: Option<String>,
    pub roll_number: Option<String>,
    pub section: Option<String>,
    pub session: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PromotionOutcome {
    pub student: Student,
    pub previous: Enrollment,
    pub enrollment: Enrollment,
    pub fees: Vec<Fee>,
}

#[derive(Debug, Clone)]
pub struct BulkItemError {
    pub student: String,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct BulkOutcome {
    pub successful: Vec<PromotionOutcome>,
    pub errors: Vec<BulkItemError>,
}

pub fn parse_object_id(value: &str, label: &str) -> Result<ObjectId, ServiceError> {
    ObjectId::parse_str(value.trim())
        .map_err(|_| ServiceError::bad_request(format!("Invalid {}: {}", label, value)))
}

/// Session label of the new enrollment: explicit, else the year after the
/// prior session for a promotion, else the current year.
pub fn next_session_label(requested: Option<&str>, previous: &str, now: DateTime<Utc>) -> String {
    if let Some(label) = requested.map(str::trim).filter(|s| !s.is_empty()) {
        return label.to_string();
    }
    let previous_year = academic_year(previous, now.year() - 1);
    (previous_year + 1).max(now.year()).to_string()
}

#[derive(Clone)]
pub struct PromotionService {
    db: SchoolDb,
    fee_policy: FeePolicyConfig,
}

impl PromotionService {
    pub fn new(db: SchoolDb, fee_policy: FeePolicyConfig) -> Self {
        Self { db, fee_policy }
    }

    #[tracing::instrument(skip(self, input), fields(student = %input.student))]
    pub async fn promote(&self, input: PromotionInput) -> Result<PromotionOutcome, ServiceError> {
        let service = self.clone();
        let outcome = run_in_transaction(self.db.client(), move |session| {
            Box::pin(async move {
                service
                    .move_student(&input, PromotionKind::Promote, Utc::now(), session)
                    .await
            })
        })
        .await?;

        metrics::record_promotions(PromotionKind::Promote.as_str(), 1);
        tracing::info!(
            student_id = %outcome.student.student_id,
            from = %outcome.previous.class_name,
            to = %outcome.enrollment.class_name,
            fees = outcome.fees.len(),
            "Student promoted"
        );
        Ok(outcome)
    }

    /// Promote many students in one transaction.
    ///
    /// Per-student validation failures are collected; any other error rolls
    /// back the whole batch.
    #[tracing::instrument(skip(self, inputs), fields(count = inputs.len()))]
    pub async fn bulk_promote(&self, inputs: Vec<PromotionInput>) -> Result<BulkOutcome, ServiceError> {
        self.run_bulk(inputs, PromotionKind::Promote).await
    }

    /// Keep many students in their current class for another session.
    #[tracing::instrument(skip(self, inputs), fields(count = inputs.len()))]
    pub async fn bulk_retain(&self, inputs: Vec<PromotionInput>) -> Result<BulkOutcome, ServiceError> {
        self.run_bulk(inputs, PromotionKind::Retain).await
    }

    async fn run_bulk(
        &self,
        inputs: Vec<PromotionInput>,
        kind: PromotionKind,
    ) -> Result<BulkOutcome, ServiceError> {
        if inputs.is_empty() {
            return Err(ServiceError::bad_request("No students given"));
        }

        let service = self.clone();
        let outcome = run_in_transaction(self.db.client(), move |session| {
            Box::pin(async move {
                let now = Utc::now();
                let mut outcome = BulkOutcome::default();
                for input in &inputs {
                    match service.move_student(input, kind, now, session).await {
                        Ok(moved) => outcome.successful.push(moved),
                        Err(e) if e.is_validation() => {
                            tracing::warn!(student = %input.student, error = %e, "Skipping student");
                            outcome.errors.push(BulkItemError {
                                student: input.student.clone(),
                                message: e.to_string(),
                            });
                        }
                        Err(e) => return Err(e),
                    }
                }
                Ok(outcome)
            })
        })
        .await?;

        metrics::record_promotions(kind.as_str(), outcome.successful.len());
        tracing::info!(
            kind = kind.as_str(),
            successful = outcome.successful.len(),
            failed = outcome.errors.len(),
            "Bulk promotion finished"
        );
        Ok(outcome)
    }

    /// Validate everything first, then write. A validation error therefore
    /// leaves nothing behind in the shared transaction.
    async fn move_student(
        &self,
        input: &PromotionInput,
        kind: PromotionKind,
        now: DateTime<Utc>,
        session: &mut ClientSession,
    ) -> Result<PromotionOutcome, ServiceError> {
        let target_id = match kind {
            PromotionKind::Promote => {
                let raw = input
                    .class_id
                    .as_deref()
                    .ok_or_else(|| ServiceError::bad_request("Target class is required"))?;
                Some(parse_object_id(raw, "class id")?)
            }
            PromotionKind::Retain => None,
        };

        let mut student = find_student(&self.db, &input.student, session).await?;

        let options = FindOneOptions::builder()
            .sort(doc! { "created_at": -1 })
            .build();
        let mut previous = self
            .db
            .enrollments()
            .find_one_with_session(
                doc! { "student": student.id, "status": EnrollmentStatus::Active.as_str() },
                options,
                session,
            )
            .await?
            .ok_or_else(|| {
                ServiceError::not_found(format!(
                    "Student {} has no active enrollment",
                    student.student_id
                ))
            })?;

        let target_id = match target_id {
            Some(id) => id,
            None => previous.class_ids.first().copied().ok_or_else(|| {
                ServiceError::bad_request(format!(
                    "Current enrollment of {} is not linked to a class",
                    student.student_id
                ))
            })?,
        };
        let class: SchoolClass = self
            .db
            .classes()
            .find_one_with_session(doc! { "_id": target_id }, None, session)
            .await?
            .ok_or_else(|| ServiceError::not_found("Target class not found"))?;

        if kind == PromotionKind::Promote {
            let already = self
                .db
                .enrollments()
                .find_one_with_session(
                    doc! {
                        "student": student.id,
                        "status": EnrollmentStatus::Active.as_str(),
                        "class_ids": class.id,
                    },
                    None,
                    session,
                )
                .await?;
            if already.is_some() {
                return Err(ServiceError::bad_request(format!(
                    "Student {} is already enrolled in {}",
                    student.student_id, class.name
                )));
            }
        }

        let session_label = next_session_label(input.session.as_deref(), &previous.session, now);
        let enrollment_id = ObjectId::new();
        let ctx = FeeContext {
            student: student.id,
            enrollment: enrollment_id,
            class_name: class.name.clone(),
            year: academic_year(&session_label, now.year()),
            due_day: self.fee_policy.due_day_of_month,
            now,
        };
        let fees = FeeCalculator::structure_fees(&ctx, &class.fee_structure);
        let totals = EnrollmentTotals::from_fees(&fees);

        let section = input
            .section
            .clone()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| match kind {
                PromotionKind::Retain => previous.section.clone(),
                PromotionKind::Promote => None,
            });
        let roll_number = input
            .roll_number
            .clone()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| match kind {
                PromotionKind::Retain => previous.roll_number.clone(),
                PromotionKind::Promote => None,
            });

        let enrollment = Enrollment {
            id: enrollment_id,
            student: student.id,
            student_name: student.name.clone(),
            class_ids: vec![class.id],
            class_name: class.name.clone(),
            section,
            roll_number,
            session: session_label,
            status: EnrollmentStatus::Active,
            admission_type: AdmissionType::Promotion,
            promoted_from: Some(previous.id),
            promoted_to: None,
            fees: fees.iter().map(|f| f.id).collect(),
            total_amount: totals.total_amount,
            paid_amount: totals.paid_amount,
            due_amount: totals.due_amount,
            payment_status: totals.payment_status,
            payment_method: None,
            created_at: now,
            updated_at: now,
        };

        // Close the prior enrollment first so the active-enrollment index
        // never sees two active rows for the same class.
        previous.status = kind.closing_status();
        previous.promoted_to = Some(enrollment.id);
        previous.updated_at = now;
        self.db
            .enrollments()
            .update_one_with_session(
                doc! { "_id": previous.id },
                doc! { "$set": {
                    "status": previous.status.as_str(),
                    "promoted_to": enrollment.id,
                    "updated_at": now,
                } },
                None,
                session,
            )
            .await?;
        self.db
            .enrollments()
            .insert_one_with_session(&enrollment, None, session)
            .await?;
        if !fees.is_empty() {
            self.db
                .fees()
                .insert_many_with_session(&fees, None, session)
                .await?;
        }

        student.place_in(Some(&enrollment));
        student.fees.extend(fees.iter().map(|f| f.id));
        student.updated_at = now;
        self.db
            .students()
            .replace_one_with_session(doc! { "_id": student.id }, &student, None, session)
            .await?;

        Ok(PromotionOutcome {
            student,
            previous,
            enrollment,
            fees,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn rejects_malformed_ids() {
        assert!(parse_object_id("not-an-id", "class id").is_err());
        let id = ObjectId::new();
        assert_eq!(parse_object_id(&id.to_hex(), "class id").unwrap(), id);
    }

    #[test]
    fn session_label_advances_a_year() {
        let now = Utc.with_ymd_and_hms(2025, 1, 5, 0, 0, 0).unwrap();
        assert_eq!(next_session_label(None, "2024", now), "2025");
        assert_eq!(next_session_label(None, "2025", now), "2026");
        assert_eq!(next_session_label(Some("2027"), "2024", now), "2027");
        assert_eq!(next_session_label(Some(" "), "garbage", now), "2025");
    }

    #[test]
    fn closing_status_depends_on_kind() {
        assert_eq!(PromotionKind::Promote.closing_status(), EnrollmentStatus::Passed);
        assert_eq!(PromotionKind::Retain.closing_status(), EnrollmentStatus::Failed);
    }
}
