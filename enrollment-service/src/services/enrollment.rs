//! Admission, enrollment update with fee re-issuance, and enrollment removal.
//!
//! Each operation is one MongoDB transaction touching students, enrollments,
//! fees, payments and receipts.

use std::collections::HashSet;

use chrono::{DateTime, Datelike, Utc};
use mongodb::{
    bson::{doc, oid::ObjectId, Document},
    ClientSession,
};

use super::classes::{resolve_classes, ResolvedClass};
use super::database::{find_all, find_all_unscoped, SchoolDb};
use super::error::ServiceError;
use super::fees::{academic_year, EnrollmentTotals, FeeBatch, FeeCalculator, FeeContext, FeeLine};
use super::metrics;
use super::receipts::{next_receipt_no, PaymentBundle, ReceiptBuilder};
use super::student_ids::generate_student_id;
use super::transaction::run_in_transaction;
use crate::config::{FeePolicyConfig, InstituteConfig};
use crate::models::{
    AdmissionType, ClassSelection, Enrollment, EnrollmentStatus, Fee, Payment, Receipt, Student,
};

pub const DEFAULT_PAYMENT_METHOD: &str = "cash";

/// Identity fields of the admitted student.
#[derive(Debug, Clone, Default)]
pub struct StudentDetails {
    pub student_id: Option<String>,
    pub name: String,
    pub father_name: Option<String>,
    pub mother_name: Option<String>,
    pub guardian_name: Option<String>,
    pub mobile: Option<String>,
    pub guardian_mobile: Option<String>,
    pub address: Option<String>,
    pub department: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct AdmissionInput {
    pub student: StudentDetails,
    pub classes: ClassSelection,
    /// Free-text class name used when the selection resolves to nothing.
    pub class_name: Option<String>,
    pub section: Option<String>,
    pub roll_number: Option<String>,
    pub session: Option<String>,
    pub fees: Vec<FeeLine>,
    pub payment_method: Option<String>,
}

/// Partial update of an enrollment. `fees`, when present, replaces billing.
#[derive(Debug, Clone, Default)]
pub struct EnrollmentChanges {
    pub section: Option<String>,
    pub roll_number: Option<String>,
    pub session: Option<String>,
    pub status: Option<EnrollmentStatus>,
    pub classes: Option<ClassSelection>,
    pub class_name: Option<String>,
    pub payment_method: Option<String>,
    pub fees: Option<Vec<FeeLine>>,
}

/// Everything an admission or update wrote.
#[derive(Debug, Clone)]
pub struct EnrollmentWrite {
    pub student: Student,
    pub enrollment: Enrollment,
    pub fees: Vec<Fee>,
    pub payment: Option<Payment>,
    pub receipt: Option<Receipt>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeletionSummary {
    pub enrollment: ObjectId,
    pub fees_deleted: usize,
    pub payments_deleted: usize,
    pub receipts_deleted: usize,
}

/// Which payments lose their fees entirely and which only shrink.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaymentRelease {
    pub delete: Vec<ObjectId>,
    pub trim: Vec<ObjectId>,
}

impl PaymentRelease {
    /// A payment is deleted when every fee it covers is being removed.
    pub fn plan(removed_fees: &HashSet<ObjectId>, payments: &[Payment]) -> Self {
        let mut release = PaymentRelease::default();
        for payment in payments {
            if payment.fees.iter().all(|f| removed_fees.contains(f)) {
                release.delete.push(payment.id);
            } else {
                release.trim.push(payment.id);
            }
        }
        release
    }

    /// Note left on a trimmed payment. Its amount and receipt are not
    /// rewritten, so they still include the removed fees.
    pub fn trim_note(enrollment: ObjectId) -> String {
        format!(
            "Fees of enrollment {} were removed; amount and receipt still include them",
            enrollment.to_hex()
        )
    }
}

/// Ids removed while releasing an enrollment's billing.
#[derive(Debug, Clone, Default)]
struct ReleasedBilling {
    fee_ids: HashSet<ObjectId>,
    payment_ids: HashSet<ObjectId>,
    receipt_ids: HashSet<ObjectId>,
}

impl ReleasedBilling {
    fn unlink_from(&self, student: &mut Student) {
        student.fees.retain(|id| !self.fee_ids.contains(id));
        student.payments.retain(|id| !self.payment_ids.contains(id));
        student.receipts.retain(|id| !self.receipt_ids.contains(id));
    }
}

pub fn validate_fee_lines(lines: &[FeeLine]) -> Result<(), ServiceError> {
    for line in lines {
        if line.fee_type.trim().is_empty() {
            return Err(ServiceError::bad_request("Fee type is required"));
        }
        let values = [line.amount, line.discount, line.waiver, line.advance];
        if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(ServiceError::bad_request(format!(
                "Amounts for {} must be non-negative numbers",
                line.fee_type
            )));
        }
    }
    Ok(())
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn overwrite(target: &mut Option<String>, value: &Option<String>) {
    if let Some(v) = non_empty(value.as_deref()) {
        *target = Some(v);
    }
}

#[derive(Clone)]
pub struct EnrollmentService {
    db: SchoolDb,
    institute: InstituteConfig,
    fee_policy: FeePolicyConfig,
}

impl EnrollmentService {
    pub fn new(db: SchoolDb, institute: InstituteConfig, fee_policy: FeePolicyConfig) -> Self {
        Self {
            db,
            institute,
            fee_policy,
        }
    }

    /// Admit a student: student, enrollment, fees, payment and receipt.
    #[tracing::instrument(skip(self, input), fields(student_name = %input.student.name))]
    pub async fn create(&self, input: AdmissionInput) -> Result<EnrollmentWrite, ServiceError> {
        if input.student.name.trim().is_empty() {
            return Err(ServiceError::bad_request("Student name is required"));
        }
        validate_fee_lines(&input.fees)?;

        let service = self.clone();
        let result = run_in_transaction(self.db.client(), move |session| {
            Box::pin(async move { service.admit(input, Utc::now(), session).await })
        })
        .await;

        metrics::record_enrollment("create", result.is_ok());
        let written = result.map_err(|e| {
            tracing::warn!(error = %e, "Admission rolled back");
            e
        })?;

        if let Some(payment) = &written.payment {
            metrics::record_payment(payment.total_amount);
        }
        tracing::info!(
            student_id = %written.student.student_id,
            enrollment_id = %written.enrollment.id,
            fees = written.fees.len(),
            receipt_no = written.receipt.as_ref().map(|r| r.receipt_no.as_str()).unwrap_or("-"),
            "Student admitted"
        );
        Ok(written)
    }

    /// Apply scalar changes and, when fees are given, re-issue billing.
    #[tracing::instrument(skip(self, changes))]
    pub async fn update(
        &self,
        id: ObjectId,
        changes: EnrollmentChanges,
    ) -> Result<EnrollmentWrite, ServiceError> {
        if let Some(lines) = &changes.fees {
            validate_fee_lines(lines)?;
        }

        let service = self.clone();
        let result = run_in_transaction(self.db.client(), move |session| {
            Box::pin(async move { service.apply_changes(id, changes, Utc::now(), session).await })
        })
        .await;

        metrics::record_enrollment("update", result.is_ok());
        let written = result?;
        if let Some(payment) = &written.payment {
            metrics::record_payment(payment.total_amount);
        }
        tracing::info!(
            enrollment_id = %written.enrollment.id,
            total = written.enrollment.total_amount,
            due = written.enrollment.due_amount,
            "Enrollment updated"
        );
        Ok(written)
    }

    pub async fn get(&self, id: ObjectId) -> Result<(Enrollment, Vec<Fee>), ServiceError> {
        let enrollment = self
            .db
            .enrollments()
            .find_one(doc! { "_id": id }, None)
            .await?
            .ok_or_else(|| ServiceError::not_found("Enrollment not found"))?;
        let fees = find_all_unscoped(
            &self.db.fees(),
            doc! { "enrollment": id },
            Some(doc! { "due_date": 1 }),
        )
        .await?;
        Ok((enrollment, fees))
    }

    /// Remove an enrollment with its fees, payments, receipts and links.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, id: ObjectId) -> Result<DeletionSummary, ServiceError> {
        let service = self.clone();
        let summary = run_in_transaction(self.db.client(), move |session| {
            Box::pin(async move { service.remove(id, Utc::now(), session).await })
        })
        .await?;

        metrics::record_enrollment("delete", true);
        tracing::info!(
            enrollment_id = %summary.enrollment,
            fees = summary.fees_deleted,
            payments = summary.payments_deleted,
            receipts = summary.receipts_deleted,
            "Enrollment deleted"
        );
        Ok(summary)
    }

    async fn admit(
        &self,
        input: AdmissionInput,
        now: DateTime<Utc>,
        session: &mut ClientSession,
    ) -> Result<EnrollmentWrite, ServiceError> {
        let class = resolve_classes(
            &self.db,
            &input.classes,
            input.class_name.as_deref(),
            input.student.department.as_deref(),
            session,
        )
        .await?;

        let (mut student, is_new) = self
            .upsert_student(&input.student, &class, now, session)
            .await?;
        self.ensure_not_enrolled(student.id, &class.ids, &class.name, None, session)
            .await?;

        let session_label =
            non_empty(input.session.as_deref()).unwrap_or_else(|| now.year().to_string());
        let enrollment_id = ObjectId::new();
        let ctx = FeeContext {
            student: student.id,
            enrollment: enrollment_id,
            class_name: class.name.clone(),
            year: academic_year(&session_label, now.year()),
            due_day: self.fee_policy.due_day_of_month,
            now,
        };
        let batch = FeeCalculator::admission_fees(&ctx, &input.fees);
        let totals = EnrollmentTotals::from_fees(&batch.fees);
        let payment_method = non_empty(input.payment_method.as_deref());

        let enrollment = Enrollment {
            id: enrollment_id,
            student: student.id,
            student_name: student.name.clone(),
            class_ids: class.ids.clone(),
            class_name: class.name.clone(),
            section: non_empty(input.section.as_deref()),
            roll_number: non_empty(input.roll_number.as_deref()),
            session: session_label,
            status: EnrollmentStatus::Active,
            admission_type: AdmissionType::Admission,
            promoted_from: None,
            promoted_to: None,
            fees: batch.ids(),
            total_amount: totals.total_amount,
            paid_amount: totals.paid_amount,
            due_amount: totals.due_amount,
            payment_status: totals.payment_status,
            payment_method: payment_method.clone(),
            created_at: now,
            updated_at: now,
        };

        student.class_ids = class.ids.clone();
        student.class_name = class.name.clone();
        overwrite(&mut student.section, &input.section);
        overwrite(&mut student.roll_number, &input.roll_number);
        student.current_enrollment = Some(enrollment.id);
        student.fees.extend(batch.ids());
        student.updated_at = now;

        let bundle = self
            .collect_payment(
                &mut student,
                enrollment.id,
                &class.name,
                &batch,
                payment_method.as_deref(),
                now,
                session,
            )
            .await?;

        if is_new {
            self.db
                .students()
                .insert_one_with_session(&student, None, session)
                .await?;
        } else {
            self.db
                .students()
                .replace_one_with_session(doc! { "_id": student.id }, &student, None, session)
                .await?;
        }
        self.db
            .enrollments()
            .insert_one_with_session(&enrollment, None, session)
            .await?;
        if !batch.fees.is_empty() {
            self.db
                .fees()
                .insert_many_with_session(&batch.fees, None, session)
                .await?;
        }
        self.store_payment(bundle.as_ref(), session).await?;

        let (payment, receipt) = split_bundle(bundle);
        Ok(EnrollmentWrite {
            student,
            enrollment,
            fees: batch.fees,
            payment,
            receipt,
        })
    }

    async fn apply_changes(
        &self,
        id: ObjectId,
        changes: EnrollmentChanges,
        now: DateTime<Utc>,
        session: &mut ClientSession,
    ) -> Result<EnrollmentWrite, ServiceError> {
        let mut enrollment = self
            .db
            .enrollments()
            .find_one_with_session(doc! { "_id": id }, None, session)
            .await?
            .ok_or_else(|| ServiceError::not_found("Enrollment not found"))?;
        let mut student = self
            .db
            .students()
            .find_one_with_session(doc! { "_id": enrollment.student }, None, session)
            .await?
            .ok_or_else(|| ServiceError::not_found("Student for enrollment not found"))?;

        overwrite(&mut enrollment.section, &changes.section);
        overwrite(&mut enrollment.roll_number, &changes.roll_number);
        if let Some(label) = non_empty(changes.session.as_deref()) {
            enrollment.session = label;
        }
        if let Some(method) = non_empty(changes.payment_method.as_deref()) {
            enrollment.payment_method = Some(method);
        }
        if let Some(status) = changes.status {
            enrollment.status = status;
        }

        let class_changed = changes.classes.is_some() || changes.class_name.is_some();
        if class_changed {
            let selection = changes.classes.clone().unwrap_or_default();
            let ResolvedClass { ids, name, .. } = resolve_classes(
                &self.db,
                &selection,
                changes.class_name.as_deref(),
                student.department.as_deref(),
                session,
            )
            .await?;
            enrollment.class_ids = ids;
            enrollment.class_name = name;
        }
        if enrollment.status == EnrollmentStatus::Active && (class_changed || changes.status.is_some()) {
            self.ensure_not_enrolled(
                student.id,
                &enrollment.class_ids,
                &enrollment.class_name,
                Some(enrollment.id),
                session,
            )
            .await?;
        }

        if student.current_enrollment == Some(enrollment.id) {
            student.class_ids = enrollment.class_ids.clone();
            student.class_name = enrollment.class_name.clone();
            student.section = enrollment.section.clone();
            student.roll_number = enrollment.roll_number.clone();
        }

        let mut bundle = None;
        let fees = match changes.fees {
            Some(lines) => {
                let released = self.release_billing(&enrollment, false, session).await?;
                released.unlink_from(&mut student);
                tracing::info!(
                    enrollment_id = %enrollment.id,
                    fees = released.fee_ids.len(),
                    payments = released.payment_ids.len(),
                    "Released previous billing"
                );

                let ctx = FeeContext {
                    student: student.id,
                    enrollment: enrollment.id,
                    class_name: enrollment.class_name.clone(),
                    year: academic_year(&enrollment.session, now.year()),
                    due_day: self.fee_policy.due_day_of_month,
                    now,
                };
                let batch = FeeCalculator::reissued_fees(&ctx, &lines);
                let totals = EnrollmentTotals::from_fees(&batch.fees);

                enrollment.fees = batch.ids();
                enrollment.total_amount = totals.total_amount;
                enrollment.paid_amount = totals.paid_amount;
                enrollment.due_amount = totals.due_amount;
                enrollment.payment_status = totals.payment_status;
                student.fees.extend(batch.ids());

                let method = enrollment.payment_method.clone();
                bundle = self
                    .collect_payment(
                        &mut student,
                        enrollment.id,
                        &enrollment.class_name,
                        &batch,
                        method.as_deref(),
                        now,
                        session,
                    )
                    .await?;

                if !batch.fees.is_empty() {
                    self.db
                        .fees()
                        .insert_many_with_session(&batch.fees, None, session)
                        .await?;
                }
                batch.fees
            }
            None => {
                find_all(
                    &self.db.fees(),
                    doc! { "enrollment": enrollment.id },
                    Some(doc! { "due_date": 1 }),
                    session,
                )
                .await?
            }
        };

        enrollment.updated_at = now;
        student.updated_at = now;
        self.db
            .enrollments()
            .replace_one_with_session(doc! { "_id": enrollment.id }, &enrollment, None, session)
            .await?;
        self.db
            .students()
            .replace_one_with_session(doc! { "_id": student.id }, &student, None, session)
            .await?;
        self.store_payment(bundle.as_ref(), session).await?;

        let (payment, receipt) = split_bundle(bundle);
        Ok(EnrollmentWrite {
            student,
            enrollment,
            fees,
            payment,
            receipt,
        })
    }

    async fn remove(
        &self,
        id: ObjectId,
        now: DateTime<Utc>,
        session: &mut ClientSession,
    ) -> Result<DeletionSummary, ServiceError> {
        let enrollment = self
            .db
            .enrollments()
            .find_one_with_session(doc! { "_id": id }, None, session)
            .await?
            .ok_or_else(|| ServiceError::not_found("Enrollment not found"))?;

        let released = self.release_billing(&enrollment, true, session).await?;

        self.db
            .enrollments()
            .update_many_with_session(
                doc! { "promoted_to": id },
                doc! { "$unset": { "promoted_to": "" }, "$set": { "updated_at": now } },
                None,
                session,
            )
            .await?;

        let student = self
            .db
            .students()
            .find_one_with_session(doc! { "_id": enrollment.student }, None, session)
            .await?;
        if let Some(mut student) = student {
            released.unlink_from(&mut student);
            if student.current_enrollment == Some(id) {
                let previous = match enrollment.promoted_from {
                    Some(prev) => {
                        self.db
                            .enrollments()
                            .find_one_with_session(doc! { "_id": prev }, None, session)
                            .await?
                    }
                    None => None,
                };
                student.place_in(previous.as_ref());
            }
            student.updated_at = now;
            self.db
                .students()
                .replace_one_with_session(doc! { "_id": student.id }, &student, None, session)
                .await?;
        } else {
            tracing::warn!(student = %enrollment.student, "Enrollment references a missing student");
        }

        self.db
            .enrollments()
            .delete_one_with_session(doc! { "_id": id }, None, session)
            .await?;

        Ok(DeletionSummary {
            enrollment: id,
            fees_deleted: released.fee_ids.len(),
            payments_deleted: released.payment_ids.len(),
            receipts_deleted: released.receipt_ids.len(),
        })
    }

    /// Delete the enrollment's fees (late-fee records included) and the
    /// payments and receipts that only covered those fees.
    async fn release_billing(
        &self,
        enrollment: &Enrollment,
        whole_enrollment: bool,
        session: &mut ClientSession,
    ) -> Result<ReleasedBilling, ServiceError> {
        let old_fees = find_all(
            &self.db.fees(),
            doc! { "enrollment": enrollment.id },
            None,
            session,
        )
        .await?;
        let fee_ids: HashSet<ObjectId> = old_fees
            .iter()
            .map(|f| f.id)
            .chain(enrollment.fees.iter().copied())
            .collect();
        let fee_list: Vec<ObjectId> = fee_ids.iter().copied().collect();

        let payment_filter: Document = if whole_enrollment {
            doc! { "$or": [
                { "fees": { "$in": fee_list.clone() } },
                { "enrollment": enrollment.id },
            ] }
        } else {
            doc! { "fees": { "$in": fee_list.clone() } }
        };
        let payments = find_all(&self.db.payments(), payment_filter, None, session).await?;
        let release = PaymentRelease::plan(&fee_ids, &payments);

        let mut receipt_ids = HashSet::new();
        if !release.delete.is_empty() {
            let receipts = find_all(
                &self.db.receipts(),
                doc! { "payment": { "$in": release.delete.clone() } },
                None,
                session,
            )
            .await?;
            receipt_ids.extend(receipts.iter().map(|r| r.id));

            self.db
                .receipts()
                .delete_many_with_session(
                    doc! { "payment": { "$in": release.delete.clone() } },
                    None,
                    session,
                )
                .await?;
            self.db
                .payments()
                .delete_many_with_session(
                    doc! { "_id": { "$in": release.delete.clone() } },
                    None,
                    session,
                )
                .await?;
        }
        if !release.trim.is_empty() {
            self.db
                .payments()
                .update_many_with_session(
                    doc! { "_id": { "$in": release.trim.clone() } },
                    doc! {
                        "$pull": { "fees": { "$in": fee_list.clone() } },
                        "$set": { "note": PaymentRelease::trim_note(enrollment.id) },
                    },
                    None,
                    session,
                )
                .await?;
            tracing::warn!(
                enrollment = %enrollment.id,
                payments = release.trim.len(),
                "Payments shared with other fees were trimmed; totals left unchanged"
            );
        }
        if !fee_list.is_empty() {
            self.db
                .fees()
                .delete_many_with_session(doc! { "_id": { "$in": fee_list } }, None, session)
                .await?;
        }

        Ok(ReleasedBilling {
            fee_ids,
            payment_ids: release.delete.into_iter().collect(),
            receipt_ids,
        })
    }

    async fn upsert_student(
        &self,
        details: &StudentDetails,
        class: &ResolvedClass,
        now: DateTime<Utc>,
        session: &mut ClientSession,
    ) -> Result<(Student, bool), ServiceError> {
        let given_id = non_empty(details.student_id.as_deref());

        let mut existing = None;
        if let Some(student_id) = &given_id {
            existing = self
                .db
                .students()
                .find_one_with_session(doc! { "student_id": student_id.as_str() }, None, session)
                .await?;
        }
        if existing.is_none() {
            let numbers: Vec<String> = [details.mobile.as_deref(), details.guardian_mobile.as_deref()]
                .into_iter()
                .filter_map(non_empty)
                .collect();
            if !numbers.is_empty() {
                existing = self
                    .db
                    .students()
                    .find_one_with_session(
                        doc! { "$or": [
                            { "mobile": { "$in": numbers.clone() } },
                            { "guardian_mobile": { "$in": numbers } },
                        ] },
                        None,
                        session,
                    )
                    .await?;
            }
        }

        match existing {
            Some(mut student) => {
                student.name = details.name.trim().to_string();
                overwrite(&mut student.father_name, &details.father_name);
                overwrite(&mut student.mother_name, &details.mother_name);
                overwrite(&mut student.guardian_name, &details.guardian_name);
                overwrite(&mut student.mobile, &details.mobile);
                overwrite(&mut student.guardian_mobile, &details.guardian_mobile);
                overwrite(&mut student.address, &details.address);
                overwrite(&mut student.department, &details.department);
                tracing::info!(student_id = %student.student_id, "Matched existing student");
                Ok((student, false))
            }
            None => {
                let student_id = match given_id {
                    Some(id) => id,
                    None => generate_student_id(&self.db, &class.code, session).await?,
                };
                let student = Student {
                    id: ObjectId::new(),
                    student_id,
                    name: details.name.trim().to_string(),
                    father_name: non_empty(details.father_name.as_deref()),
                    mother_name: non_empty(details.mother_name.as_deref()),
                    guardian_name: non_empty(details.guardian_name.as_deref()),
                    mobile: non_empty(details.mobile.as_deref()),
                    guardian_mobile: non_empty(details.guardian_mobile.as_deref()),
                    address: non_empty(details.address.as_deref()),
                    department: non_empty(details.department.as_deref()),
                    class_ids: class.ids.clone(),
                    class_name: class.name.clone(),
                    section: None,
                    roll_number: None,
                    current_enrollment: None,
                    advance_balance: 0.0,
                    fees: Vec::new(),
                    payments: Vec::new(),
                    receipts: Vec::new(),
                    created_at: now,
                    updated_at: now,
                };
                tracing::info!(student_id = %student.student_id, "Creating new student");
                Ok((student, true))
            }
        }
    }

    /// Reject a second active enrollment of the student in the same class.
    async fn ensure_not_enrolled(
        &self,
        student: ObjectId,
        class_ids: &[ObjectId],
        class_name: &str,
        exclude: Option<ObjectId>,
        session: &mut ClientSession,
    ) -> Result<(), ServiceError> {
        let mut filter = doc! {
            "student": student,
            "status": EnrollmentStatus::Active.as_str(),
        };
        if class_ids.is_empty() {
            filter.insert("class_name", class_name);
        } else {
            filter.insert("class_ids", doc! { "$in": class_ids.to_vec() });
        }
        if let Some(id) = exclude {
            filter.insert("_id", doc! { "$ne": id });
        }

        let existing = self
            .db
            .enrollments()
            .find_one_with_session(filter, None, session)
            .await?;
        match existing {
            Some(_) => Err(ServiceError::bad_request(format!(
                "Student already has an active enrollment in {}",
                class_name
            ))),
            None => Ok(()),
        }
    }

    /// Build the payment and receipt for money collected in this call, and
    /// link them (and any excess advance) to the student.
    #[allow(clippy::too_many_arguments)]
    async fn collect_payment(
        &self,
        student: &mut Student,
        enrollment: ObjectId,
        class_name: &str,
        batch: &FeeBatch,
        payment_method: Option<&str>,
        now: DateTime<Utc>,
        session: &mut ClientSession,
    ) -> Result<Option<PaymentBundle>, ServiceError> {
        if batch.collected() <= 0.0 {
            return Ok(None);
        }

        student.advance_balance += batch.advance_credit;
        let receipt_no = next_receipt_no(&self.db, now, session).await?;
        let builder = ReceiptBuilder {
            student,
            enrollment,
            class_name,
            institute: &self.institute,
            payment_method: payment_method.unwrap_or(DEFAULT_PAYMENT_METHOD),
            now,
        };
        let bundle = builder.build(receipt_no, batch.paid_fees(), batch.advance_credit);

        student.payments.push(bundle.payment.id);
        student.receipts.push(bundle.receipt.id);
        Ok(Some(bundle))
    }

    async fn store_payment(
        &self,
        bundle: Option<&PaymentBundle>,
        session: &mut ClientSession,
    ) -> Result<(), ServiceError> {
        if let Some(bundle) = bundle {
            self.db
                .payments()
                .insert_one_with_session(&bundle.payment, None, session)
                .await?;
            self.db
                .receipts()
                .insert_one_with_session(&bundle.receipt, None, session)
                .await?;
        }
        Ok(())
    }
}

fn split_bundle(bundle: Option<PaymentBundle>) -> (Option<Payment>, Option<Receipt>) {
    match bundle {
        Some(PaymentBundle { payment, receipt }) => (Some(payment), Some(receipt)),
        None => (None, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PaymentRecordStatus;

    fn payment(fees: Vec<ObjectId>) -> Payment {
        Payment {
            id: ObjectId::new(),
            receipt_no: "RCPT-2025-000001".to_string(),
            student: ObjectId::new(),
            enrollment: ObjectId::new(),
            fees,
            total_amount: 100.0,
            payment_method: "cash".to_string(),
            status: PaymentRecordStatus::Completed,
            note: None,
            created_at: Utc::now(),
        }
    }

    fn line(fee_type: &str, amount: f64) -> FeeLine {
        FeeLine {
            fee_type: fee_type.to_string(),
            amount,
            discount: 0.0,
            waiver: 0.0,
            advance: 0.0,
            due_date: None,
        }
    }

    #[test]
    fn payments_covering_only_removed_fees_are_deleted() {
        let (a, b, other) = (ObjectId::new(), ObjectId::new(), ObjectId::new());
        let removed: HashSet<ObjectId> = [a, b].into_iter().collect();
        let exclusive = payment(vec![a, b]);
        let shared = payment(vec![a, other]);

        let release = PaymentRelease::plan(&removed, &[exclusive.clone(), shared.clone()]);
        assert_eq!(release.delete, vec![exclusive.id]);
        assert_eq!(release.trim, vec![shared.id]);
    }

    #[test]
    fn trimmed_payment_note_names_the_enrollment() {
        let enrollment = ObjectId::new();
        let note = PaymentRelease::trim_note(enrollment);
        assert!(note.contains(&enrollment.to_hex()));
        assert!(note.contains("receipt"));
    }

    #[test]
    fn fee_lines_must_be_non_negative() {
        assert!(validate_fee_lines(&[line("Tuition Fee", 1000.0)]).is_ok());
        assert!(validate_fee_lines(&[line("Tuition Fee", -5.0)]).is_err());
        assert!(validate_fee_lines(&[line("  ", 100.0)]).is_err());

        let mut bad_advance = line("Exam Fee", 100.0);
        bad_advance.advance = f64::NAN;
        assert!(validate_fee_lines(&[bad_advance]).is_err());
    }

    #[test]
    fn blank_values_do_not_overwrite() {
        let mut section = Some("A".to_string());
        overwrite(&mut section, &Some("   ".to_string()));
        assert_eq!(section.as_deref(), Some("A"));
        overwrite(&mut section, &Some("B".to_string()));
        assert_eq!(section.as_deref(), Some("B"));
        overwrite(&mut section, &None);
        assert_eq!(section.as_deref(), Some("B"));
    }
}
