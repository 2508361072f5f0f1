//! JSON views of stored documents. ObjectIds are rendered as hex strings.

use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::Serialize;

use crate::models::{
    Enrollment, Fee, FeeStructureItem, InstituteSnapshot, LateFeeCustomization, LateFeeRun,
    LateFeeSettings, Payment, Receipt, ReceiptSummary, SchoolClass, Student, StudentSnapshot,
};

fn hex(id: &ObjectId) -> String {
    id.to_hex()
}

fn hex_all(ids: &[ObjectId]) -> Vec<String> {
    ids.iter().map(hex).collect()
}

#[derive(Debug, Serialize)]
pub struct StudentResponse {
    pub id: String,
    pub student_id: String,
    pub name: String,
    pub father_name: Option<String>,
    pub mother_name: Option<String>,
    pub guardian_name: Option<String>,
    pub mobile: Option<String>,
    pub guardian_mobile: Option<String>,
    pub department: Option<String>,
    pub class_ids: Vec<String>,
    pub class_name: String,
    pub section: Option<String>,
    pub roll_number: Option<String>,
    pub current_enrollment: Option<String>,
    pub advance_balance: f64,
    pub fees: Vec<String>,
    pub payments: Vec<String>,
    pub receipts: Vec<String>,
}

impl From<&Student> for StudentResponse {
    fn from(s: &Student) -> Self {
        Self {
            id: hex(&s.id),
            student_id: s.student_id.clone(),
            name: s.name.clone(),
            father_name: s.father_name.clone(),
            mother_name: s.mother_name.clone(),
            guardian_name: s.guardian_name.clone(),
            mobile: s.mobile.clone(),
            guardian_mobile: s.guardian_mobile.clone(),
            department: s.department.clone(),
            class_ids: hex_all(&s.class_ids),
            class_name: s.class_name.clone(),
            section: s.section.clone(),
            roll_number: s.roll_number.clone(),
            current_enrollment: s.current_enrollment.as_ref().map(hex),
            advance_balance: s.advance_balance,
            fees: hex_all(&s.fees),
            payments: hex_all(&s.payments),
            receipts: hex_all(&s.receipts),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EnrollmentResponse {
    pub id: String,
    pub student: String,
    pub student_name: String,
    pub class_ids: Vec<String>,
    pub class_name: String,
    pub section: Option<String>,
    pub roll_number: Option<String>,
    pub session: String,
    pub status: String,
    pub admission_type: String,
    pub promoted_from: Option<String>,
    pub promoted_to: Option<String>,
    pub fees: Vec<String>,
    pub total_amount: f64,
    pub paid_amount: f64,
    pub due_amount: f64,
    pub payment_status: String,
    pub payment_method: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Enrollment> for EnrollmentResponse {
    fn from(e: &Enrollment) -> Self {
        Self {
            id: hex(&e.id),
            student: hex(&e.student),
            student_name: e.student_name.clone(),
            class_ids: hex_all(&e.class_ids),
            class_name: e.class_name.clone(),
            section: e.section.clone(),
            roll_number: e.roll_number.clone(),
            session: e.session.clone(),
            status: e.status.to_string(),
            admission_type: e.admission_type.as_str().to_string(),
            promoted_from: e.promoted_from.as_ref().map(hex),
            promoted_to: e.promoted_to.as_ref().map(hex),
            fees: hex_all(&e.fees),
            total_amount: e.total_amount,
            paid_amount: e.paid_amount,
            due_amount: e.due_amount,
            payment_status: e.payment_status.as_str().to_string(),
            payment_method: e.payment_method.clone(),
            created_at: e.created_at,
            updated_at: e.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CustomizationResponse {
    pub previous_amount: f64,
    pub new_amount: f64,
    pub reason: String,
    pub customized_by: Option<String>,
    pub customized_at: DateTime<Utc>,
}

impl From<&LateFeeCustomization> for CustomizationResponse {
    fn from(c: &LateFeeCustomization) -> Self {
        Self {
            previous_amount: c.previous_amount,
            new_amount: c.new_amount,
            reason: c.reason.clone(),
            customized_by: c.customized_by.clone(),
            customized_at: c.customized_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FeeResponse {
    pub id: String,
    pub student: String,
    pub enrollment: String,
    pub class_name: String,
    pub fee_type: String,
    pub month: Option<String>,
    pub year: i32,
    pub amount: f64,
    pub discount: f64,
    pub waiver: f64,
    pub paid_amount: f64,
    pub due_amount: f64,
    pub status: String,
    pub due_date: DateTime<Utc>,
    pub is_monthly: bool,
    pub late_fee_per_day: Option<f64>,
    pub late_fee_amount: f64,
    pub late_fee_days: i64,
    pub late_fee_applied: bool,
    pub late_fee_customized: bool,
    pub late_fee_customizations: Vec<CustomizationResponse>,
    pub last_late_fee_calculation: Option<DateTime<Utc>>,
    pub is_late_fee_record: bool,
    pub parent_fee: Option<String>,
}

impl From<&Fee> for FeeResponse {
    fn from(f: &Fee) -> Self {
        Self {
            id: hex(&f.id),
            student: hex(&f.student),
            enrollment: hex(&f.enrollment),
            class_name: f.class_name.clone(),
            fee_type: f.fee_type.clone(),
            month: f.month.clone(),
            year: f.year,
            amount: f.amount,
            discount: f.discount,
            waiver: f.waiver,
            paid_amount: f.paid_amount,
            due_amount: f.due_amount,
            status: f.status.as_str().to_string(),
            due_date: f.due_date,
            is_monthly: f.is_monthly,
            late_fee_per_day: f.late_fee_per_day,
            late_fee_amount: f.late_fee_amount,
            late_fee_days: f.late_fee_days,
            late_fee_applied: f.late_fee_applied,
            late_fee_customized: f.late_fee_customized,
            late_fee_customizations: f.late_fee_customizations.iter().map(Into::into).collect(),
            last_late_fee_calculation: f.last_late_fee_calculation,
            is_late_fee_record: f.is_late_fee_record,
            parent_fee: f.parent_fee.as_ref().map(hex),
        }
    }
}

pub fn fee_list(fees: &[Fee]) -> Vec<FeeResponse> {
    fees.iter().map(FeeResponse::from).collect()
}

#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub id: String,
    pub receipt_no: String,
    pub student: String,
    pub enrollment: String,
    pub fees: Vec<String>,
    pub total_amount: f64,
    pub payment_method: String,
    pub status: String,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&Payment> for PaymentResponse {
    fn from(p: &Payment) -> Self {
        Self {
            id: hex(&p.id),
            receipt_no: p.receipt_no.clone(),
            student: hex(&p.student),
            enrollment: hex(&p.enrollment),
            fees: hex_all(&p.fees),
            total_amount: p.total_amount,
            payment_method: p.payment_method.clone(),
            status: p.status.as_str().to_string(),
            note: p.note.clone(),
            created_at: p.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReceiptItemResponse {
    pub fee: String,
    pub fee_type: String,
    pub month: Option<String>,
    pub amount: f64,
    pub discount: f64,
    pub paid: f64,
    pub due: f64,
}

#[derive(Debug, Serialize)]
pub struct ReceiptResponse {
    pub id: String,
    pub receipt_no: String,
    pub payment: String,
    pub student: String,
    pub student_snapshot: StudentSnapshot,
    pub items: Vec<ReceiptItemResponse>,
    pub summary: ReceiptSummary,
    pub institute: InstituteSnapshot,
    pub payment_method: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Receipt> for ReceiptResponse {
    fn from(r: &Receipt) -> Self {
        Self {
            id: hex(&r.id),
            receipt_no: r.receipt_no.clone(),
            payment: hex(&r.payment),
            student: hex(&r.student),
            student_snapshot: r.student_snapshot.clone(),
            items: r
                .items
                .iter()
                .map(|i| ReceiptItemResponse {
                    fee: hex(&i.fee),
                    fee_type: i.fee_type.clone(),
                    month: i.month.clone(),
                    amount: i.amount,
                    discount: i.discount,
                    paid: i.paid,
                    due: i.due,
                })
                .collect(),
            summary: r.summary.clone(),
            institute: r.institute.clone(),
            payment_method: r.payment_method.clone(),
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ClassResponse {
    pub id: String,
    pub name: String,
    pub code: String,
    pub department: Option<String>,
    pub fee_structure: Vec<FeeStructureItem>,
    pub created_at: DateTime<Utc>,
}

impl From<&SchoolClass> for ClassResponse {
    fn from(c: &SchoolClass) -> Self {
        Self {
            id: hex(&c.id),
            name: c.name.clone(),
            code: c.id_code(),
            department: c.department.clone(),
            fee_structure: c.fee_structure.clone(),
            created_at: c.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LateFeeSettingsResponse {
    pub enabled: bool,
    pub per_day_rate: f64,
    pub max_percentage: f64,
    pub grace_period_days: i64,
    pub applicable_fee_types: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<&LateFeeSettings> for LateFeeSettingsResponse {
    fn from(s: &LateFeeSettings) -> Self {
        Self {
            enabled: s.enabled,
            per_day_rate: s.per_day_rate,
            max_percentage: s.max_percentage,
            grace_period_days: s.grace_period_days,
            applicable_fee_types: s.applicable_fee_types.clone(),
            updated_at: s.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RunErrorResponse {
    pub fee: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct LateFeeRunResponse {
    pub id: String,
    pub processed: u32,
    pub updated: u32,
    pub skipped: u32,
    pub records_created: u32,
    pub records_updated: u32,
    pub errors: Vec<RunErrorResponse>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl From<&LateFeeRun> for LateFeeRunResponse {
    fn from(r: &LateFeeRun) -> Self {
        Self {
            id: hex(&r.id),
            processed: r.processed,
            updated: r.updated,
            skipped: r.skipped,
            records_created: r.records_created,
            records_updated: r.records_updated,
            errors: r
                .errors
                .iter()
                .map(|e| RunErrorResponse {
                    fee: hex(&e.fee),
                    message: e.message.clone(),
                })
                .collect(),
            started_at: r.started_at,
            finished_at: r.finished_at,
        }
    }
}
