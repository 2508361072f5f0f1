//! Late-fee persistence: settings, the daily batch and staff overrides.

use chrono::{DateTime, Utc};
use mongodb::{
    bson::{doc, oid::ObjectId, Document},
    options::ReplaceOptions,
    ClientSession,
};

use super::database::{find_all, SchoolDb};
use super::error::ServiceError;
use super::late_fee_calculator::{LateFeeCalculator, LateFeeState};
use super::metrics;
use super::transaction::run_in_transaction;
use crate::models::{Fee, FeeStatus, LateFeeRun, LateFeeSettings, RunItemError, LATE_FEE_SETTINGS_ID};

/// A staff override of a late fee.
#[derive(Debug, Clone)]
pub struct LateFeeOverride {
    pub amount: f64,
    pub reason: String,
    pub customized_by: Option<String>,
}

/// Scope of a bulk override for one student.
#[derive(Debug, Clone, Default)]
pub struct FeePeriod {
    pub month: Option<String>,
    pub year: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FeeOutcome {
    Skipped,
    Updated { record_created: bool, record_updated: bool },
}

#[derive(Clone)]
pub struct LateFeeService {
    db: SchoolDb,
}

impl LateFeeService {
    pub fn new(db: SchoolDb) -> Self {
        Self { db }
    }

    /// Stored settings, or the defaults when none were saved yet.
    pub async fn load_settings(&self) -> Result<LateFeeSettings, ServiceError> {
        let settings = self
            .db
            .settings()
            .find_one(doc! { "_id": LATE_FEE_SETTINGS_ID }, None)
            .await?;
        Ok(settings.unwrap_or_default())
    }

    #[tracing::instrument(skip(self))]
    pub async fn save_settings(
        &self,
        mut settings: LateFeeSettings,
    ) -> Result<LateFeeSettings, ServiceError> {
        if settings.per_day_rate < 0.0 {
            return Err(ServiceError::bad_request("per_day_rate cannot be negative"));
        }
        if !(0.0..=100.0).contains(&settings.max_percentage) {
            return Err(ServiceError::bad_request(
                "max_percentage must be between 0 and 100",
            ));
        }
        if settings.grace_period_days < 0 {
            return Err(ServiceError::bad_request(
                "grace_period_days cannot be negative",
            ));
        }

        settings.id = LATE_FEE_SETTINGS_ID.to_string();
        settings.updated_at = Utc::now();

        let options = ReplaceOptions::builder().upsert(true).build();
        self.db
            .settings()
            .replace_one(doc! { "_id": LATE_FEE_SETTINGS_ID }, &settings, options)
            .await?;

        tracing::info!(
            enabled = settings.enabled,
            per_day_rate = settings.per_day_rate,
            max_percentage = settings.max_percentage,
            grace_period_days = settings.grace_period_days,
            "Late fee settings saved"
        );
        Ok(settings)
    }

    /// Recalculate late fees on every overdue fee not yet processed today.
    ///
    /// Runs in one transaction. A failure on one fee is recorded in the run
    /// summary and the batch moves on.
    #[tracing::instrument(skip(self))]
    pub async fn apply_daily_late_fees(
        &self,
        now: DateTime<Utc>,
    ) -> Result<LateFeeRun, ServiceError> {
        let settings = self.load_settings().await?;
        let mut run = LateFeeRun {
            id: ObjectId::new(),
            processed: 0,
            updated: 0,
            skipped: 0,
            records_created: 0,
            records_updated: 0,
            errors: Vec::new(),
            started_at: now,
            finished_at: now,
        };

        if !settings.enabled {
            tracing::info!("Late fees disabled, skipping batch");
            run.finished_at = Utc::now();
            return Ok(run);
        }

        let db = self.db.clone();
        let run = run_in_transaction(self.db.client(), move |session| {
            Box::pin(async move {
                let today_start = start_of_day(now);
                let candidates = find_all(
                    &db.fees(),
                    doc! {
                        "status": { "$in": FeeStatus::outstanding().to_vec() },
                        "due_date": { "$lt": today_start },
                        "is_late_fee_record": { "$ne": true },
                        "$or": [
                            { "last_late_fee_calculation": { "$exists": false } },
                            { "last_late_fee_calculation": null },
                            { "last_late_fee_calculation": { "$lt": today_start } },
                        ],
                    },
                    None,
                    session,
                )
                .await?;

                tracing::info!(candidates = candidates.len(), "Applying late fees");

                for fee in candidates {
                    run.processed += 1;
                    if !settings.applies_to(&fee.fee_type) {
                        run.skipped += 1;
                        continue;
                    }
                    let fee_id = fee.id;
                    match process_fee(&db, &settings, fee, now, session).await {
                        Ok(FeeOutcome::Skipped) => run.skipped += 1,
                        Ok(FeeOutcome::Updated {
                            record_created,
                            record_updated,
                        }) => {
                            run.updated += 1;
                            run.records_created += u32::from(record_created);
                            run.records_updated += u32::from(record_updated);
                        }
                        Err(e) => {
                            tracing::error!(fee_id = %fee_id, error = %e, "Failed to apply late fee");
                            run.errors.push(RunItemError {
                                fee: fee_id,
                                message: e.to_string(),
                            });
                        }
                    }
                }

                run.finished_at = Utc::now();
                Ok(run)
            })
        })
        .await?;

        if let Err(e) = self.db.late_fee_runs().insert_one(&run, None).await {
            tracing::warn!(error = %e, "Failed to persist late fee run summary");
        }
        metrics::record_late_fee_run(run.updated, run.errors.len());

        tracing::info!(
            processed = run.processed,
            updated = run.updated,
            skipped = run.skipped,
            records_created = run.records_created,
            errors = run.errors.len(),
            "Late fee batch finished"
        );
        Ok(run)
    }

    /// Fix the late fee of one fee at a staff-chosen amount.
    #[tracing::instrument(skip(self, input), fields(amount = input.amount))]
    pub async fn customize_late_fee(
        &self,
        fee_id: ObjectId,
        input: LateFeeOverride,
    ) -> Result<Fee, ServiceError> {
        validate_override(&input)?;

        let db = self.db.clone();
        let fee = run_in_transaction(self.db.client(), move |session| {
            Box::pin(async move {
                let fee = db
                    .fees()
                    .find_one_with_session(doc! { "_id": fee_id }, None, session)
                    .await?
                    .ok_or_else(|| ServiceError::not_found("Fee not found"))?;
                ensure_customizable(&fee)?;
                override_fee(&db, fee, &input, Utc::now(), session).await
            })
        })
        .await?;

        metrics::record_late_fee_customization(1);
        tracing::info!(fee_id = %fee.id, late_fee = fee.late_fee_amount, "Late fee customized");
        Ok(fee)
    }

    /// Apply the same override to every outstanding fee of a student.
    #[tracing::instrument(skip(self, input))]
    pub async fn customize_student_late_fees(
        &self,
        student_id: ObjectId,
        period: FeePeriod,
        input: LateFeeOverride,
    ) -> Result<Vec<Fee>, ServiceError> {
        validate_override(&input)?;

        let db = self.db.clone();
        let fees = run_in_transaction(self.db.client(), move |session| {
            Box::pin(async move {
                let mut filter = doc! {
                    "student": student_id,
                    "status": { "$in": FeeStatus::outstanding().to_vec() },
                    "is_late_fee_record": { "$ne": true },
                };
                if let Some(month) = &period.month {
                    filter.insert("month", month.as_str());
                }
                if let Some(year) = period.year {
                    filter.insert("year", year);
                }

                let fees = find_all(&db.fees(), filter, Some(doc! { "due_date": 1 }), session).await?;
                if fees.is_empty() {
                    return Err(ServiceError::not_found(
                        "No outstanding fees found for this student",
                    ));
                }

                let now = Utc::now();
                let mut updated = Vec::with_capacity(fees.len());
                for fee in fees {
                    updated.push(override_fee(&db, fee, &input, now, session).await?);
                }
                Ok(updated)
            })
        })
        .await?;

        metrics::record_late_fee_customization(fees.len());
        tracing::info!(student = %student_id, count = fees.len(), "Student late fees customized");
        Ok(fees)
    }
}

fn validate_override(input: &LateFeeOverride) -> Result<(), ServiceError> {
    if !input.amount.is_finite() || input.amount < 0.0 {
        return Err(ServiceError::bad_request(
            "Late fee amount must be a non-negative number",
        ));
    }
    if input.reason.trim().is_empty() {
        return Err(ServiceError::bad_request("A reason is required"));
    }
    Ok(())
}

/// Only outstanding base fees carry a late fee that can be overridden.
fn ensure_customizable(fee: &Fee) -> Result<(), ServiceError> {
    if fee.is_late_fee_record {
        return Err(ServiceError::bad_request(
            "Late fee records cannot be customized; customize the original fee",
        ));
    }
    if !fee.is_outstanding() {
        return Err(ServiceError::bad_request(
            "Late fee can only be customized on an unpaid or partially paid fee",
        ));
    }
    Ok(())
}

fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .unwrap_or(now)
}

async fn process_fee(
    db: &SchoolDb,
    settings: &LateFeeSettings,
    mut fee: Fee,
    now: DateTime<Utc>,
    session: &mut ClientSession,
) -> Result<FeeOutcome, ServiceError> {
    let assessment = LateFeeCalculator::assess(&fee, settings, now.date_naive());
    LateFeeCalculator::apply(&mut fee, &assessment, now);
    db.fees()
        .replace_one_with_session(doc! { "_id": fee.id }, &fee, None, session)
        .await?;

    if assessment.state == LateFeeState::NotDue {
        return Ok(FeeOutcome::Skipped);
    }

    let (record_created, record_updated) = sync_late_fee_record(db, &fee, now, session).await?;
    Ok(FeeOutcome::Updated {
        record_created,
        record_updated,
    })
}

async fn override_fee(
    db: &SchoolDb,
    mut fee: Fee,
    input: &LateFeeOverride,
    now: DateTime<Utc>,
    session: &mut ClientSession,
) -> Result<Fee, ServiceError> {
    LateFeeCalculator::customize(
        &mut fee,
        input.amount,
        &input.reason,
        input.customized_by.as_deref(),
        now,
    );
    db.fees()
        .replace_one_with_session(doc! { "_id": fee.id }, &fee, None, session)
        .await?;
    sync_late_fee_record(db, &fee, now, session).await?;
    Ok(fee)
}

/// Create or update the companion record of `parent`.
///
/// Returns `(created, updated)`. No record is created for a zero late fee.
async fn sync_late_fee_record(
    db: &SchoolDb,
    parent: &Fee,
    now: DateTime<Utc>,
    session: &mut ClientSession,
) -> Result<(bool, bool), ServiceError> {
    let existing = db
        .fees()
        .find_one_with_session(
            doc! { "parent_fee": parent.id, "is_late_fee_record": true },
            None,
            session,
        )
        .await?;

    match existing {
        Some(mut record) => {
            LateFeeCalculator::sync_record(&mut record, parent, now);
            db.fees()
                .replace_one_with_session(doc! { "_id": record.id }, &record, None, session)
                .await?;
            Ok((false, true))
        }
        None if parent.late_fee_amount > 0.0 => {
            let record = LateFeeCalculator::late_fee_record(parent, now);
            db.fees()
                .insert_one_with_session(&record, None, session)
                .await?;
            let link: Document = doc! {
                "$addToSet": { "fees": record.id },
                "$set": { "updated_at": now },
            };
            db.students()
                .update_one_with_session(doc! { "_id": parent.student }, link, None, session)
                .await?;
            Ok((true, false))
        }
        None => Ok((false, false)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::fees::{FeeCalculator, FeeContext, FeeLine};
    use chrono::TimeZone;

    #[test]
    fn day_starts_at_midnight_utc() {
        let now = Utc.with_ymd_and_hms(2025, 4, 3, 17, 45, 12).unwrap();
        assert_eq!(
            start_of_day(now),
            Utc.with_ymd_and_hms(2025, 4, 3, 0, 0, 0).unwrap()
        );
    }

    fn tuition_fee() -> Fee {
        let ctx = FeeContext {
            student: ObjectId::new(),
            enrollment: ObjectId::new(),
            class_name: "Class 5".to_string(),
            year: 2025,
            due_day: 10,
            now: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        };
        let line = FeeLine {
            fee_type: "Tuition Fee".to_string(),
            amount: 1000.0,
            discount: 0.0,
            waiver: 0.0,
            advance: 0.0,
            due_date: Some(Utc.with_ymd_and_hms(2025, 1, 10, 0, 0, 0).unwrap()),
        };
        FeeCalculator::admission_fees(&ctx, &[line]).fees.remove(0)
    }

    #[test]
    fn settled_fees_cannot_be_customized() {
        let mut fee = tuition_fee();
        assert!(ensure_customizable(&fee).is_ok());

        fee.status = FeeStatus::Partial;
        assert!(ensure_customizable(&fee).is_ok());

        fee.status = FeeStatus::Paid;
        fee.paid_amount = fee.amount;
        fee.due_amount = 0.0;
        let err = ensure_customizable(&fee).unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));
        assert!(err.to_string().contains("unpaid or partially paid"));
    }

    #[test]
    fn late_fee_records_cannot_be_customized() {
        let mut fee = tuition_fee();
        fee.is_late_fee_record = true;
        assert!(matches!(
            ensure_customizable(&fee),
            Err(ServiceError::BadRequest(_))
        ));
    }

    #[test]
    fn override_requires_reason_and_non_negative_amount() {
        let ok = LateFeeOverride {
            amount: 25.0,
            reason: "Hardship".to_string(),
            customized_by: None,
        };
        assert!(validate_override(&ok).is_ok());

        let negative = LateFeeOverride {
            amount: -1.0,
            ..ok.clone()
        };
        assert!(validate_override(&negative).is_err());

        let blank = LateFeeOverride {
            reason: "  ".to_string(),
            ..ok
        };
        assert!(validate_override(&blank).is_err());
    }
}
