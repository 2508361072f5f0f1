use chrono::{DateTime, Datelike, Utc};
use mongodb::{
    bson::{doc, oid::ObjectId, Document},
    ClientSession,
};

use super::database::SchoolDb;
use super::error::ServiceError;
use super::fees::round_money;
use crate::config::InstituteConfig;
use crate::models::{
    Fee, InstituteSnapshot, Payment, PaymentRecordStatus, Receipt, ReceiptItem, ReceiptSummary,
    Student, StudentSnapshot,
};

pub fn format_receipt_no(year: i32, seq: i64) -> String {
    format!("RCPT-{}-{:06}", year, seq)
}

/// Reserve the next receipt number for the current year.
pub async fn next_receipt_no(
    db: &SchoolDb,
    now: DateTime<Utc>,
    session: &mut ClientSession,
) -> Result<String, ServiceError> {
    let year = now.year();
    let seq = db
        .next_sequence(&format!("receipt_{}", year), session)
        .await?;
    Ok(format_receipt_no(year, seq))
}

/// A payment and the receipt that documents it.
#[derive(Debug, Clone)]
pub struct PaymentBundle {
    pub payment: Payment,
    pub receipt: Receipt,
}

pub struct ReceiptBuilder<'a> {
    pub student: &'a Student,
    pub enrollment: ObjectId,
    pub class_name: &'a str,
    pub institute: &'a InstituteConfig,
    pub payment_method: &'a str,
    pub now: DateTime<Utc>,
}

impl ReceiptBuilder<'_> {
    /// Payment plus receipt for the fees that received money in this call.
    ///
    /// `advance_credit` is money collected beyond what the fees absorbed; it
    /// is part of the payment total and shown separately on the receipt.
    pub fn build<'f>(
        &self,
        receipt_no: String,
        paid_fees: impl IntoIterator<Item = &'f Fee>,
        advance_credit: f64,
    ) -> PaymentBundle {
        let items: Vec<ReceiptItem> = paid_fees
            .into_iter()
            .map(|fee| ReceiptItem {
                fee: fee.id,
                fee_type: fee.fee_type.clone(),
                month: fee.month.clone(),
                amount: fee.amount,
                discount: round_money(fee.discount + fee.waiver),
                paid: fee.paid_amount,
                due: fee.due_amount,
            })
            .collect();

        let applied: f64 = items.iter().map(|i| i.paid).sum();
        let total_amount = round_money(applied + advance_credit);

        let payment = Payment {
            id: ObjectId::new(),
            receipt_no: receipt_no.clone(),
            student: self.student.id,
            enrollment: self.enrollment,
            fees: items.iter().map(|i| i.fee).collect(),
            total_amount,
            payment_method: self.payment_method.to_string(),
            status: PaymentRecordStatus::Completed,
            note: (advance_credit > 0.0)
                .then(|| format!("{:.2} credited to advance balance", advance_credit)),
            created_at: self.now,
        };

        let summary = ReceiptSummary {
            total_amount: round_money(items.iter().map(|i| i.amount).sum()),
            total_discount: round_money(items.iter().map(|i| i.discount).sum()),
            amount_paid: payment.total_amount,
            advance_credit: round_money(advance_credit),
            due_amount: round_money(items.iter().map(|i| i.due).sum()),
        };

        let receipt = Receipt {
            id: ObjectId::new(),
            receipt_no,
            payment: payment.id,
            student: self.student.id,
            student_snapshot: StudentSnapshot {
                student_id: self.student.student_id.clone(),
                name: self.student.name.clone(),
                class_name: self.class_name.to_string(),
                section: self.student.section.clone(),
                roll_number: self.student.roll_number.clone(),
                mobile: self.student.contact_number().map(str::to_string),
            },
            items,
            summary,
            institute: InstituteSnapshot {
                name: self.institute.name.clone(),
                address: self.institute.address.clone(),
                phone: self.institute.phone.clone(),
            },
            payment_method: self.payment_method.to_string(),
            created_at: self.now,
        };

        PaymentBundle { payment, receipt }
    }
}

/// Filter for a receipt given either its ObjectId hex or its receipt number.
pub fn receipt_filter(key: &str) -> Document {
    let key = key.trim();
    match ObjectId::parse_str(key) {
        Ok(id) => doc! { "_id": id },
        Err(_) => doc! { "receipt_no": key },
    }
}

pub async fn find_receipt(db: &SchoolDb, key: &str) -> Result<Receipt, ServiceError> {
    db.receipts()
        .find_one(receipt_filter(key), None)
        .await?
        .ok_or_else(|| ServiceError::not_found(format!("Receipt {} not found", key.trim())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::fees::{FeeCalculator, FeeContext, FeeLine};

    fn student() -> Student {
        Student {
            id: ObjectId::new(),
            student_id: "CII2505001".to_string(),
            name: "Abdullah".to_string(),
            father_name: None,
            mother_name: None,
            guardian_name: None,
            mobile: None,
            guardian_mobile: Some("01700000000".to_string()),
            address: None,
            department: None,
            class_ids: Vec::new(),
            class_name: "Class 5".to_string(),
            section: Some("A".to_string()),
            roll_number: Some("7".to_string()),
            current_enrollment: None,
            advance_balance: 0.0,
            fees: Vec::new(),
            payments: Vec::new(),
            receipts: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn institute() -> InstituteConfig {
        InstituteConfig {
            name: "Darul Uloom".to_string(),
            address: "Dhaka".to_string(),
            phone: "0200000".to_string(),
        }
    }

    fn paid_fee(amount: f64, discount: f64, advance: f64) -> (Vec<Fee>, f64) {
        let ctx = FeeContext {
            student: ObjectId::new(),
            enrollment: ObjectId::new(),
            class_name: "Class 5".to_string(),
            year: 2025,
            due_day: 10,
            now: Utc::now(),
        };
        let batch = FeeCalculator::admission_fees(
            &ctx,
            &[FeeLine {
                fee_type: "Tuition Fee".to_string(),
                amount,
                discount,
                waiver: 0.0,
                advance,
                due_date: None,
            }],
        );
        (batch.fees, batch.advance_credit)
    }

    #[test]
    fn receipt_number_is_zero_padded() {
        assert_eq!(format_receipt_no(2025, 42), "RCPT-2025-000042");
    }

    #[test]
    fn receipt_matches_payment_total() {
        let student = student();
        let institute = institute();
        let (fees, credit) = paid_fee(1000.0, 0.0, 400.0);
        let builder = ReceiptBuilder {
            student: &student,
            enrollment: ObjectId::new(),
            class_name: "Class 5",
            institute: &institute,
            payment_method: "cash",
            now: Utc::now(),
        };

        let bundle = builder.build("RCPT-2025-000001".to_string(), &fees, credit);

        assert_eq!(bundle.payment.total_amount, 400.0);
        assert_eq!(bundle.receipt.summary.amount_paid, 400.0);
        assert_eq!(bundle.receipt.summary.due_amount, 600.0);
        assert_eq!(bundle.receipt.items.len(), 1);
        assert_eq!(bundle.receipt.payment, bundle.payment.id);
        assert_eq!(bundle.receipt.student_snapshot.mobile.as_deref(), Some("01700000000"));
        assert_eq!(bundle.receipt.institute.name, "Darul Uloom");
    }

    #[test]
    fn advance_credit_is_part_of_amount_paid() {
        let student = student();
        let institute = institute();
        let (fees, credit) = paid_fee(500.0, 100.0, 450.0);
        let builder = ReceiptBuilder {
            student: &student,
            enrollment: ObjectId::new(),
            class_name: "Class 5",
            institute: &institute,
            payment_method: "bkash",
            now: Utc::now(),
        };

        let bundle = builder.build("RCPT-2025-000002".to_string(), &fees, credit);

        assert_eq!(bundle.payment.total_amount, 450.0);
        assert_eq!(bundle.receipt.summary.amount_paid, 450.0);
        assert_eq!(bundle.receipt.summary.advance_credit, 50.0);
        assert_eq!(bundle.receipt.summary.total_discount, 100.0);
        assert!(bundle.payment.note.is_some());
    }

    #[test]
    fn receipts_are_found_by_id_or_number() {
        let id = ObjectId::new();
        assert_eq!(receipt_filter(&id.to_hex()), doc! { "_id": id });
        assert_eq!(
            receipt_filter(" RCPT-2025-000001 "),
            doc! { "receipt_no": "RCPT-2025-000001" }
        );
    }
}
