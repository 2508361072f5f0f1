//! Fee arithmetic and fee-document generation.
//!
//! Everything here is pure: orchestrators build the documents with these
//! helpers and then persist them inside their transaction.

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use mongodb::bson::oid::ObjectId;

use crate::models::{Fee, FeeStatus, FeeStructureItem, PaymentStatus};

pub const MONTHS: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// Round to paisa.
pub fn round_money(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `max(0, amount - paid - discount - waiver)`.
pub fn base_due(amount: f64, paid: f64, discount: f64, waiver: f64) -> f64 {
    round_money((amount - paid - discount - waiver).max(0.0))
}

pub fn fee_status(base_due: f64, paid: f64) -> FeeStatus {
    if base_due <= 0.0 {
        FeeStatus::Paid
    } else if paid > 0.0 {
        FeeStatus::Partial
    } else {
        FeeStatus::Unpaid
    }
}

pub fn payment_status(due: f64, paid: f64) -> PaymentStatus {
    if due <= 0.0 {
        PaymentStatus::Paid
    } else if paid > 0.0 {
        PaymentStatus::Partial
    } else {
        PaymentStatus::Pending
    }
}

pub fn is_monthly_fee_type(fee_type: &str) -> bool {
    fee_type.to_lowercase().contains("monthly")
}

/// 1-based month number to its name.
pub fn month_name(month: u32) -> &'static str {
    MONTHS[(month.clamp(1, 12) - 1) as usize]
}

/// Academic year of a session label ("2025", "2025-2026"), else `fallback`.
pub fn academic_year(session: &str, fallback: i32) -> i32 {
    session
        .trim()
        .get(..4)
        .and_then(|s| s.parse::<i32>().ok())
        .filter(|y| (1900..=2999).contains(y))
        .unwrap_or(fallback)
}

pub fn default_due_date(year: i32, month: u32, due_day: u32) -> DateTime<Utc> {
    let date = NaiveDate::from_ymd_opt(year, month.clamp(1, 12), due_day.clamp(1, 28))
        .unwrap_or(NaiveDate::MIN);
    Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap_or_default())
}

/// Totals of an enrollment, derived from its (non late-fee) fees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnrollmentTotals {
    pub total_amount: f64,
    pub paid_amount: f64,
    pub due_amount: f64,
    pub payment_status: PaymentStatus,
}

impl EnrollmentTotals {
    pub fn from_fees<'a>(fees: impl IntoIterator<Item = &'a Fee>) -> Self {
        let (mut total, mut paid, mut due) = (0.0, 0.0, 0.0);
        for fee in fees.into_iter().filter(|f| !f.is_late_fee_record) {
            total += (fee.amount - fee.discount - fee.waiver).max(0.0);
            paid += fee.paid_amount;
            due += fee.base_due();
        }
        let (total, paid, due) = (round_money(total), round_money(paid), round_money(due));
        Self {
            total_amount: total,
            paid_amount: paid,
            due_amount: due,
            payment_status: payment_status(due, paid),
        }
    }
}

/// A normalized fee line item from an admission or re-issuance payload.
#[derive(Debug, Clone, PartialEq)]
pub struct FeeLine {
    pub fee_type: String,
    pub amount: f64,
    pub discount: f64,
    pub waiver: f64,
    /// Amount collected against this line right now.
    pub advance: f64,
    pub due_date: Option<DateTime<Utc>>,
}

/// Who and when the generated fees belong to.
#[derive(Debug, Clone)]
pub struct FeeContext {
    pub student: ObjectId,
    pub enrollment: ObjectId,
    pub class_name: String,
    pub year: i32,
    pub due_day: u32,
    pub now: DateTime<Utc>,
}

/// Fees produced for one orchestrator call.
#[derive(Debug, Clone, Default)]
pub struct FeeBatch {
    pub fees: Vec<Fee>,
    /// Advance paid beyond what the fees could absorb.
    pub advance_credit: f64,
}

impl FeeBatch {
    pub fn collected(&self) -> f64 {
        round_money(self.fees.iter().map(|f| f.paid_amount).sum::<f64>() + self.advance_credit)
    }

    pub fn paid_fees(&self) -> impl Iterator<Item = &Fee> {
        self.fees.iter().filter(|f| f.paid_amount > 0.0)
    }

    pub fn ids(&self) -> Vec<ObjectId> {
        self.fees.iter().map(|f| f.id).collect()
    }
}

/// Charge description for one fee document before it is built.
struct Charge<'a> {
    fee_type: &'a str,
    amount: f64,
    discount: f64,
    waiver: f64,
    month: Option<u32>,
    due_date: DateTime<Utc>,
    is_monthly: bool,
}

pub struct FeeCalculator;

impl FeeCalculator {
    /// One fee per submitted line, each paid from its own advance.
    pub fn admission_fees(ctx: &FeeContext, lines: &[FeeLine]) -> FeeBatch {
        let mut batch = FeeBatch::default();
        for line in lines {
            let is_monthly = is_monthly_fee_type(&line.fee_type);
            let due_date = line
                .due_date
                .unwrap_or_else(|| Self::single_due_date(ctx));
            let month = if is_monthly {
                ctx.now.month()
            } else {
                due_date.month()
            };
            let charge = Charge {
                fee_type: &line.fee_type,
                amount: line.amount,
                discount: line.discount,
                waiver: line.waiver,
                month: Some(month),
                due_date,
                is_monthly,
            };
            let (fee, excess) = Self::build(ctx, charge, line.advance);
            batch.advance_credit += excess;
            batch.fees.push(fee);
        }
        batch.advance_credit = round_money(batch.advance_credit);
        batch
    }

    /// Re-issue fees for an updated enrollment.
    ///
    /// Monthly lines expand to one fee per calendar month with the discount
    /// (and waiver) split evenly; only the current month takes the advance.
    pub fn reissued_fees(ctx: &FeeContext, lines: &[FeeLine]) -> FeeBatch {
        let mut batch = FeeBatch::default();
        let current_month = ctx.now.month();
        for line in lines {
            if is_monthly_fee_type(&line.fee_type) {
                let discount = round_money(line.discount / 12.0);
                let waiver = round_money(line.waiver / 12.0);
                for month in 1..=12u32 {
                    let charge = Charge {
                        fee_type: &line.fee_type,
                        amount: line.amount,
                        discount,
                        waiver,
                        month: Some(month),
                        due_date: default_due_date(ctx.year, month, ctx.due_day),
                        is_monthly: true,
                    };
                    let advance = if month == current_month {
                        line.advance
                    } else {
                        0.0
                    };
                    let (fee, excess) = Self::build(ctx, charge, advance);
                    batch.advance_credit += excess;
                    batch.fees.push(fee);
                }
            } else {
                let due_date = line
                    .due_date
                    .unwrap_or_else(|| Self::single_due_date(ctx));
                let charge = Charge {
                    fee_type: &line.fee_type,
                    amount: line.amount,
                    discount: line.discount,
                    waiver: line.waiver,
                    month: Some(due_date.month()),
                    due_date,
                    is_monthly: false,
                };
                let (fee, excess) = Self::build(ctx, charge, line.advance);
                batch.advance_credit += excess;
                batch.fees.push(fee);
            }
        }
        batch.advance_credit = round_money(batch.advance_credit);
        batch
    }

    /// Unpaid fees from a class fee structure: twelve per monthly item, one
    /// per one-time item.
    pub fn structure_fees(ctx: &FeeContext, structure: &[FeeStructureItem]) -> Vec<Fee> {
        let mut fees = Vec::new();
        for item in structure {
            if item.is_monthly {
                for month in 1..=12u32 {
                    let charge = Charge {
                        fee_type: &item.fee_type,
                        amount: item.amount,
                        discount: 0.0,
                        waiver: 0.0,
                        month: Some(month),
                        due_date: default_due_date(ctx.year, month, ctx.due_day),
                        is_monthly: true,
                    };
                    fees.push(Self::build(ctx, charge, 0.0).0);
                }
            } else {
                let due_date = Self::single_due_date(ctx);
                let charge = Charge {
                    fee_type: &item.fee_type,
                    amount: item.amount,
                    discount: 0.0,
                    waiver: 0.0,
                    month: Some(due_date.month()),
                    due_date,
                    is_monthly: false,
                };
                fees.push(Self::build(ctx, charge, 0.0).0);
            }
        }
        fees
    }

    /// Due date of a one-time charge: this month's due day, or today once
    /// that day has passed.
    fn single_due_date(ctx: &FeeContext) -> DateTime<Utc> {
        let scheduled = default_due_date(ctx.now.year(), ctx.now.month(), ctx.due_day);
        let today = default_due_date(ctx.now.year(), ctx.now.month(), 1)
            + chrono::Duration::days(i64::from(ctx.now.day()) - 1);
        scheduled.max(today)
    }

    /// Returns the fee and the part of `advance` it could not absorb.
    fn build(ctx: &FeeContext, charge: Charge<'_>, advance: f64) -> (Fee, f64) {
        let net = base_due(charge.amount, 0.0, charge.discount, charge.waiver);
        let advance = advance.max(0.0);
        let paid = round_money(advance.min(net));

        let mut fee = Fee {
            id: ObjectId::new(),
            student: ctx.student,
            enrollment: ctx.enrollment,
            class_name: ctx.class_name.clone(),
            fee_type: charge.fee_type.to_string(),
            month: charge.month.map(|m| month_name(m).to_string()),
            year: ctx.year,
            amount: round_money(charge.amount),
            discount: charge.discount,
            waiver: charge.waiver,
            paid_amount: paid,
            due_amount: 0.0,
            status: FeeStatus::Unpaid,
            due_date: charge.due_date,
            is_monthly: charge.is_monthly,
            late_fee_per_day: None,
            late_fee_amount: 0.0,
            late_fee_days: 0,
            late_fee_applied: false,
            late_fee_customized: false,
            late_fee_customizations: Vec::new(),
            last_late_fee_calculation: None,
            is_late_fee_record: false,
            parent_fee: None,
            created_at: ctx.now,
            updated_at: ctx.now,
        };
        fee.refresh_totals();

        (fee, round_money(advance - paid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> FeeContext {
        FeeContext {
            student: ObjectId::new(),
            enrollment: ObjectId::new(),
            class_name: "Class 5".to_string(),
            year: 2025,
            due_day: 10,
            now: Utc.with_ymd_and_hms(2025, 3, 15, 9, 0, 0).unwrap(),
        }
    }

    fn line(fee_type: &str, amount: f64, discount: f64, advance: f64) -> FeeLine {
        FeeLine {
            fee_type: fee_type.to_string(),
            amount,
            discount,
            waiver: 0.0,
            advance,
            due_date: None,
        }
    }

    #[test]
    fn due_amount_never_negative() {
        assert_eq!(base_due(1000.0, 400.0, 0.0, 0.0), 600.0);
        assert_eq!(base_due(1000.0, 900.0, 200.0, 0.0), 0.0);
        assert_eq!(base_due(1000.0, 0.0, 100.0, 50.0), 850.0);
    }

    #[test]
    fn status_follows_base_due() {
        assert_eq!(fee_status(600.0, 400.0), FeeStatus::Partial);
        assert_eq!(fee_status(1000.0, 0.0), FeeStatus::Unpaid);
        assert_eq!(fee_status(0.0, 0.0), FeeStatus::Paid);
        assert_eq!(fee_status(0.0, 800.0), FeeStatus::Paid);
    }

    #[test]
    fn tuition_line_with_partial_advance() {
        let batch = FeeCalculator::admission_fees(&ctx(), &[line("Tuition Fee", 1000.0, 0.0, 400.0)]);

        assert_eq!(batch.fees.len(), 1);
        let fee = &batch.fees[0];
        assert_eq!(fee.paid_amount, 400.0);
        assert_eq!(fee.due_amount, 600.0);
        assert_eq!(fee.status, FeeStatus::Partial);
        assert_eq!(batch.collected(), 400.0);
        assert_eq!(batch.advance_credit, 0.0);
    }

    #[test]
    fn excess_advance_is_credited() {
        let batch = FeeCalculator::admission_fees(&ctx(), &[line("Admission Fee", 500.0, 100.0, 450.0)]);

        let fee = &batch.fees[0];
        assert_eq!(fee.paid_amount, 400.0);
        assert_eq!(fee.due_amount, 0.0);
        assert_eq!(fee.status, FeeStatus::Paid);
        assert_eq!(batch.advance_credit, 50.0);
        assert_eq!(batch.collected(), 450.0);
    }

    #[test]
    fn admission_does_not_expand_monthly_lines() {
        let batch = FeeCalculator::admission_fees(&ctx(), &[line("Monthly Fee", 500.0, 0.0, 0.0)]);
        assert_eq!(batch.fees.len(), 1);
        assert_eq!(batch.fees[0].month.as_deref(), Some("March"));
        assert!(batch.fees[0].is_monthly);
    }

    #[test]
    fn reissue_expands_monthly_lines_and_pays_current_month_only() {
        let batch = FeeCalculator::reissued_fees(
            &ctx(),
            &[
                line("Monthly Fee", 600.0, 1200.0, 500.0),
                line("Exam Fee", 300.0, 0.0, 0.0),
            ],
        );

        assert_eq!(batch.fees.len(), 13);
        let monthly: Vec<&Fee> = batch.fees.iter().filter(|f| f.is_monthly).collect();
        assert_eq!(monthly.len(), 12);
        assert!(monthly.iter().all(|f| f.discount == 100.0));

        let march = monthly
            .iter()
            .find(|f| f.month.as_deref() == Some("March"))
            .unwrap();
        assert_eq!(march.paid_amount, 500.0);
        assert_eq!(march.status, FeeStatus::Paid);
        assert!(monthly
            .iter()
            .filter(|f| f.month.as_deref() != Some("March"))
            .all(|f| f.paid_amount == 0.0 && f.due_amount == 500.0));

        let exam = batch.fees.iter().find(|f| f.fee_type == "Exam Fee").unwrap();
        assert_eq!(exam.month.as_deref(), Some("March"));
        assert_eq!(exam.status, FeeStatus::Unpaid);
    }

    #[test]
    fn structure_fees_are_unpaid() {
        let structure = vec![
            FeeStructureItem {
                fee_type: "Monthly Fee".to_string(),
                amount: 500.0,
                is_monthly: true,
            },
            FeeStructureItem {
                fee_type: "Session Fee".to_string(),
                amount: 1500.0,
                is_monthly: false,
            },
        ];
        let fees = FeeCalculator::structure_fees(&ctx(), &structure);

        assert_eq!(fees.len(), 13);
        assert!(fees
            .iter()
            .filter(|f| f.is_monthly)
            .all(|f| f.amount == 500.0 && f.paid_amount == 0.0 && f.status == FeeStatus::Unpaid));
        let months: Vec<_> = fees
            .iter()
            .filter(|f| f.is_monthly)
            .filter_map(|f| f.month.clone())
            .collect();
        assert_eq!(months.first().map(String::as_str), Some("January"));
        assert_eq!(months.last().map(String::as_str), Some("December"));
    }

    #[test]
    fn one_time_fees_carry_their_due_month_everywhere() {
        let mut exam = line("Exam Fee", 300.0, 0.0, 0.0);
        exam.due_date = Some(Utc.with_ymd_and_hms(2025, 5, 20, 0, 0, 0).unwrap());

        let admitted = FeeCalculator::admission_fees(&ctx(), &[exam.clone()]);
        let reissued = FeeCalculator::reissued_fees(&ctx(), &[exam]);
        assert_eq!(admitted.fees[0].month.as_deref(), Some("May"));
        assert_eq!(reissued.fees[0].month.as_deref(), Some("May"));

        let structure = FeeCalculator::structure_fees(
            &ctx(),
            &[FeeStructureItem {
                fee_type: "Session Fee".to_string(),
                amount: 1500.0,
                is_monthly: false,
            }],
        );
        let undated = FeeCalculator::admission_fees(&ctx(), &[line("Session Fee", 1500.0, 0.0, 0.0)]);
        assert_eq!(structure[0].month.as_deref(), Some("March"));
        assert_eq!(undated.fees[0].month, structure[0].month);
    }

    #[test]
    fn monthly_due_dates_use_due_day() {
        let fees = FeeCalculator::structure_fees(
            &ctx(),
            &[FeeStructureItem {
                fee_type: "Monthly Fee".to_string(),
                amount: 500.0,
                is_monthly: true,
            }],
        );
        assert_eq!(
            fees[5].due_date,
            Utc.with_ymd_and_hms(2025, 6, 10, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn single_fee_due_today_once_due_day_passed() {
        let batch = FeeCalculator::admission_fees(&ctx(), &[line("Admission Fee", 500.0, 0.0, 0.0)]);
        assert_eq!(
            batch.fees[0].due_date,
            Utc.with_ymd_and_hms(2025, 3, 15, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn totals_ignore_late_fee_records() {
        let mut batch = FeeCalculator::admission_fees(
            &ctx(),
            &[
                line("Tuition Fee", 1000.0, 0.0, 400.0),
                line("Exam Fee", 200.0, 0.0, 200.0),
            ],
        );
        let mut late = batch.fees[0].clone();
        late.is_late_fee_record = true;
        batch.fees.push(late);

        let totals = EnrollmentTotals::from_fees(&batch.fees);
        assert_eq!(totals.total_amount, 1200.0);
        assert_eq!(totals.paid_amount, 600.0);
        assert_eq!(totals.due_amount, 600.0);
        assert_eq!(totals.payment_status, PaymentStatus::Partial);
    }

    #[test]
    fn payment_status_thresholds() {
        assert_eq!(payment_status(0.0, 0.0), PaymentStatus::Paid);
        assert_eq!(payment_status(10.0, 5.0), PaymentStatus::Partial);
        assert_eq!(payment_status(10.0, 0.0), PaymentStatus::Pending);
    }

    #[test]
    fn academic_year_parses_session_labels() {
        assert_eq!(academic_year("2026", 2025), 2026);
        assert_eq!(academic_year("2025-2026", 2024), 2025);
        assert_eq!(academic_year("Spring", 2025), 2025);
    }
}
