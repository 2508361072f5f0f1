//! Late-fee arithmetic.
//!
//! Per fee the late fee moves `NotDue -> Accruing -> Fixed`. An accruing fee
//! is recomputed from scratch on every run, so running twice on the same day
//! yields the same amount. A fixed (staff customized) fee keeps its amount
//! and only has its day counter refreshed.

use chrono::{DateTime, NaiveDate, Utc};
use mongodb::bson::oid::ObjectId;

use super::fees::round_money;
use crate::models::{Fee, FeeStatus, LateFeeCustomization, LateFeeSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LateFeeState {
    NotDue,
    Accruing,
    Fixed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LateFeeAssessment {
    pub state: LateFeeState,
    pub days_late: i64,
    pub amount: f64,
}

pub struct LateFeeCalculator;

impl LateFeeCalculator {
    /// `max(0, days overdue - grace period)`.
    pub fn days_late(due_date: DateTime<Utc>, today: NaiveDate, grace_period_days: i64) -> i64 {
        let overdue = (today - due_date.date_naive()).num_days();
        (overdue - grace_period_days.max(0)).max(0)
    }

    /// `min(rate * days, max_percentage% * original)`, rounded to whole taka.
    pub fn amount(rate_per_day: f64, days_late: i64, max_percentage: f64, original: f64) -> f64 {
        let accrued = rate_per_day.max(0.0) * days_late as f64;
        let cap = max_percentage.max(0.0) / 100.0 * original.max(0.0);
        accrued.min(cap).round()
    }

    pub fn assess(fee: &Fee, settings: &LateFeeSettings, today: NaiveDate) -> LateFeeAssessment {
        let days_late = Self::days_late(fee.due_date, today, settings.grace_period_days);

        if fee.late_fee_customized {
            return LateFeeAssessment {
                state: LateFeeState::Fixed,
                days_late,
                amount: fee.late_fee_amount,
            };
        }

        if days_late == 0 {
            return LateFeeAssessment {
                state: LateFeeState::NotDue,
                days_late: 0,
                amount: 0.0,
            };
        }

        let rate = fee.late_fee_per_day.unwrap_or(settings.per_day_rate);
        LateFeeAssessment {
            state: LateFeeState::Accruing,
            days_late,
            amount: Self::amount(rate, days_late, settings.max_percentage, fee.amount),
        }
    }

    /// Write an assessment onto the original fee.
    pub fn apply(fee: &mut Fee, assessment: &LateFeeAssessment, now: DateTime<Utc>) {
        fee.late_fee_days = assessment.days_late;
        if assessment.state == LateFeeState::Accruing {
            fee.late_fee_amount = assessment.amount;
            fee.late_fee_applied = assessment.amount > 0.0;
        }
        fee.last_late_fee_calculation = Some(now);
        fee.updated_at = now;
        fee.refresh_totals();
    }

    /// Staff override: record history and fix the amount.
    pub fn customize(
        fee: &mut Fee,
        amount: f64,
        reason: &str,
        customized_by: Option<&str>,
        now: DateTime<Utc>,
    ) -> LateFeeCustomization {
        let entry = LateFeeCustomization {
            previous_amount: fee.late_fee_amount,
            new_amount: round_money(amount.max(0.0)),
            reason: reason.to_string(),
            customized_by: customized_by.map(str::to_string),
            customized_at: now,
        };
        fee.late_fee_amount = entry.new_amount;
        fee.late_fee_customized = true;
        fee.late_fee_applied = entry.new_amount > 0.0;
        fee.late_fee_customizations.push(entry.clone());
        fee.updated_at = now;
        fee.refresh_totals();
        entry
    }

    /// New companion document carrying only the late-fee charge.
    pub fn late_fee_record(parent: &Fee, now: DateTime<Utc>) -> Fee {
        let mut record = Fee {
            id: ObjectId::new(),
            student: parent.student,
            enrollment: parent.enrollment,
            class_name: parent.class_name.clone(),
            fee_type: format!("Late Fee - {}", parent.fee_type),
            month: parent.month.clone(),
            year: parent.year,
            amount: parent.late_fee_amount,
            discount: 0.0,
            waiver: 0.0,
            paid_amount: 0.0,
            due_amount: 0.0,
            status: FeeStatus::Unpaid,
            due_date: now,
            is_monthly: false,
            late_fee_per_day: None,
            late_fee_amount: 0.0,
            late_fee_days: parent.late_fee_days,
            late_fee_applied: false,
            late_fee_customized: parent.late_fee_customized,
            late_fee_customizations: Vec::new(),
            last_late_fee_calculation: Some(now),
            is_late_fee_record: true,
            parent_fee: Some(parent.id),
            created_at: now,
            updated_at: now,
        };
        record.refresh_totals();
        record
    }

    /// Bring an existing companion document in line with its parent.
    pub fn sync_record(record: &mut Fee, parent: &Fee, now: DateTime<Utc>) {
        record.amount = parent.late_fee_amount;
        record.late_fee_days = parent.late_fee_days;
        record.late_fee_customized = parent.late_fee_customized;
        record.last_late_fee_calculation = Some(now);
        record.updated_at = now;
        record.refresh_totals();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::fees::{FeeCalculator, FeeContext, FeeLine};
    use chrono::TimeZone;

    fn settings() -> LateFeeSettings {
        LateFeeSettings {
            per_day_rate: 10.0,
            max_percentage: 50.0,
            grace_period_days: 5,
            ..LateFeeSettings::default()
        }
    }

    fn overdue_fee(amount: f64) -> Fee {
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
            amount,
            discount: 0.0,
            waiver: 0.0,
            advance: 0.0,
            due_date: Some(Utc.with_ymd_and_hms(2025, 1, 10, 0, 0, 0).unwrap()),
        };
        FeeCalculator::admission_fees(&ctx, &[line]).fees.remove(0)
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
    }

    #[test]
    fn grace_period_delays_accrual() {
        let due = Utc.with_ymd_and_hms(2025, 1, 10, 0, 0, 0).unwrap();
        assert_eq!(LateFeeCalculator::days_late(due, day(12), 5), 0);
        assert_eq!(LateFeeCalculator::days_late(due, day(15), 5), 0);
        assert_eq!(LateFeeCalculator::days_late(due, day(20), 5), 5);
        assert_eq!(LateFeeCalculator::days_late(due, day(5), 0), 0);
    }

    #[test]
    fn amount_is_capped_and_rounded() {
        assert_eq!(LateFeeCalculator::amount(10.0, 5, 50.0, 1000.0), 50.0);
        assert_eq!(LateFeeCalculator::amount(10.0, 100, 50.0, 1000.0), 500.0);
        assert_eq!(LateFeeCalculator::amount(2.5, 3, 50.0, 1000.0), 8.0);
    }

    #[test]
    fn accruing_fee_adds_late_fee_to_due() {
        let mut fee = overdue_fee(1000.0);
        let assessment = LateFeeCalculator::assess(&fee, &settings(), day(20));
        assert_eq!(assessment.state, LateFeeState::Accruing);
        assert_eq!(assessment.amount, 50.0);

        LateFeeCalculator::apply(&mut fee, &assessment, Utc::now());
        assert_eq!(fee.late_fee_amount, 50.0);
        assert_eq!(fee.due_amount, 1050.0);
        assert_eq!(fee.status, FeeStatus::Unpaid);
        assert!(fee.late_fee_applied);
    }

    #[test]
    fn reapplying_on_same_day_does_not_double_count() {
        let mut fee = overdue_fee(1000.0);
        for _ in 0..2 {
            let assessment = LateFeeCalculator::assess(&fee, &settings(), day(20));
            LateFeeCalculator::apply(&mut fee, &assessment, Utc::now());
        }
        assert_eq!(fee.late_fee_amount, 50.0);
        assert_eq!(fee.due_amount, 1050.0);
    }

    #[test]
    fn fee_within_grace_is_not_due() {
        let fee = overdue_fee(1000.0);
        let assessment = LateFeeCalculator::assess(&fee, &settings(), day(14));
        assert_eq!(assessment.state, LateFeeState::NotDue);
        assert_eq!(assessment.amount, 0.0);
    }

    #[test]
    fn per_fee_rate_overrides_settings() {
        let mut fee = overdue_fee(1000.0);
        fee.late_fee_per_day = Some(20.0);
        let assessment = LateFeeCalculator::assess(&fee, &settings(), day(20));
        assert_eq!(assessment.amount, 100.0);
    }

    #[test]
    fn customized_fee_keeps_amount_but_updates_days() {
        let mut fee = overdue_fee(1000.0);
        LateFeeCalculator::customize(&mut fee, 30.0, "Guardian request", Some("office"), Utc::now());

        let assessment = LateFeeCalculator::assess(&fee, &settings(), day(25));
        assert_eq!(assessment.state, LateFeeState::Fixed);
        LateFeeCalculator::apply(&mut fee, &assessment, Utc::now());

        assert_eq!(fee.late_fee_amount, 30.0);
        assert_eq!(fee.late_fee_days, 10);
        assert_eq!(fee.due_amount, 1030.0);
    }

    #[test]
    fn customizing_twice_keeps_full_history() {
        let mut fee = overdue_fee(1000.0);
        LateFeeCalculator::customize(&mut fee, 80.0, "First review", None, Utc::now());
        LateFeeCalculator::customize(&mut fee, 20.0, "Waived most", None, Utc::now());

        assert_eq!(fee.late_fee_customizations.len(), 2);
        assert_eq!(fee.late_fee_customizations[1].previous_amount, 80.0);
        assert_eq!(fee.late_fee_amount, 20.0);
        assert_eq!(fee.due_amount, 1020.0);
    }

    #[test]
    fn companion_record_tracks_parent() {
        let mut fee = overdue_fee(1000.0);
        let assessment = LateFeeCalculator::assess(&fee, &settings(), day(20));
        LateFeeCalculator::apply(&mut fee, &assessment, Utc::now());

        let mut record = LateFeeCalculator::late_fee_record(&fee, Utc::now());
        assert!(record.is_late_fee_record);
        assert_eq!(record.parent_fee, Some(fee.id));
        assert_eq!(record.amount, 50.0);
        assert_eq!(record.due_amount, 50.0);

        LateFeeCalculator::customize(&mut fee, 0.0, "Waived", None, Utc::now());
        LateFeeCalculator::sync_record(&mut record, &fee, Utc::now());
        assert_eq!(record.amount, 0.0);
        assert_eq!(record.due_amount, 0.0);
        assert_eq!(record.status, FeeStatus::Paid);
    }
}
