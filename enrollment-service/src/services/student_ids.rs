//! Human-readable student ids: `CII<yy><class code><seq:03>`.

use chrono::{Datelike, Utc};
use mongodb::{
    bson::{doc, Document},
    ClientSession,
};

use super::database::SchoolDb;
use super::error::ServiceError;

pub const STUDENT_ID_PREFIX: &str = "CII";

pub fn student_id_prefix(year: i32, class_code: &str) -> String {
    format!("{}{:02}{}", STUDENT_ID_PREFIX, year.rem_euclid(100), class_code)
}

/// The id after `last` under `prefix`, or the first one when there is none.
pub fn next_student_id(prefix: &str, last: Option<&str>) -> String {
    let seq = last
        .and_then(|id| id.strip_prefix(prefix))
        .and_then(|rest| rest.parse::<u32>().ok())
        .map(|n| n + 1)
        .unwrap_or(1);
    format!("{}{:03}", prefix, seq)
}

/// Pipeline returning the highest id under `prefix`. Longer suffixes sort
/// first so that `...1000` ranks above `...999`.
pub fn latest_id_pipeline(prefix: &str) -> Vec<Document> {
    vec![
        doc! { "$match": { "student_id": { "$regex": format!("^{}\\d{{3,}}$", prefix) } } },
        doc! { "$project": { "student_id": 1, "len": { "$strLenCP": "$student_id" } } },
        doc! { "$sort": { "len": -1, "student_id": -1 } },
        doc! { "$limit": 1 },
    ]
}

/// Next free id for the class code, read inside the caller's transaction.
///
/// Two admissions racing for the same id are resolved by the unique index on
/// `students.student_id`; the loser's transaction fails with a conflict.
pub async fn generate_student_id(
    db: &SchoolDb,
    class_code: &str,
    session: &mut ClientSession,
) -> Result<String, ServiceError> {
    let prefix = student_id_prefix(Utc::now().year(), class_code);

    let mut cursor = db
        .students()
        .aggregate_with_session(latest_id_pipeline(&prefix), None, session)
        .await?;
    let last = match cursor.next(session).await {
        Some(row) => row?.get_str("student_id").ok().map(str::to_string),
        None => None,
    };

    Ok(next_student_id(&prefix, last.as_deref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_uses_two_digit_year() {
        assert_eq!(student_id_prefix(2025, "05"), "CII2505");
        assert_eq!(student_id_prefix(2100, "12"), "CII0012");
    }

    #[test]
    fn first_id_in_class_starts_at_one() {
        assert_eq!(next_student_id("CII2505", None), "CII2505001");
    }

    #[test]
    fn increments_last_sequence() {
        assert_eq!(next_student_id("CII2505", Some("CII2505041")), "CII2505042");
        assert_eq!(next_student_id("CII2505", Some("CII2505999")), "CII25051000");
    }

    #[test]
    fn sequence_continues_past_three_digits() {
        assert_eq!(next_student_id("CII2500", Some("CII25001000")), "CII25001001");
        assert_eq!(next_student_id("CII2500", Some("CII25001234")), "CII25001235");
    }

    #[test]
    fn latest_id_lookup_accepts_longer_suffixes_and_ranks_by_length() {
        let pipeline = latest_id_pipeline("CII2500");
        let pattern = pipeline[0]
            .get_document("$match")
            .and_then(|m| m.get_document("student_id"))
            .and_then(|f| f.get_str("$regex"))
            .unwrap();
        assert_eq!(pattern, "^CII2500\\d{3,}$");

        let sort = pipeline[2].get_document("$sort").unwrap();
        let keys: Vec<&str> = sort.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["len", "student_id"]);
        assert_eq!(sort.get_i32("len").unwrap(), -1);
    }

    #[test]
    fn unrelated_last_id_restarts_sequence() {
        assert_eq!(next_student_id("CII2505", Some("LEGACY-7")), "CII2505001");
    }
}
