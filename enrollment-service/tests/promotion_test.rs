mod common;

use common::TestApp;
use serde_json::{json, Value};

async fn admitted_student(app: &TestApp, name: &str, mobile: &str, class_id: &str) -> String {
    let data = app
        .admit(json!({
            "name": name,
            "guardian_mobile": mobile,
            "class": class_id,
            "fees": [{ "fee_type": "Admission Fee", "amount": 1000, "advance_amount": 1000 }]
        }))
        .await;
    data["student"]["student_id"].as_str().unwrap().to_string()
}

#[tokio::test]
#[ignore] // Requires MongoDB replica set
async fn promotion_opens_new_enrollment_with_a_year_of_fees() {
    let app = TestApp::spawn().await;
    let from = app.create_class("Class 5", "05", json!([])).await;
    let to = app
        .create_class(
            "Class 6",
            "06",
            json!([
                { "fee_type": "Monthly Fee", "amount": 500, "is_monthly": true },
                { "fee_type": "Exam Fee", "amount": 300 }
            ]),
        )
        .await;
    let student = admitted_student(&app, "Abdullah", "01711111111", &from).await;

    let (status, body) = app
        .post(
            "/promotions",
            json!({ "student_id": student, "new_class_id": to, "roll_number": "12" }),
        )
        .await;
    assert_eq!(status, 201, "{}", body);

    assert_eq!(body["previous_enrollment"]["status"], "passed");
    assert_eq!(body["enrollment"]["admission_type"], "promotion");
    assert_eq!(body["enrollment"]["class_name"], "Class 6");
    assert_eq!(body["enrollment"]["roll_number"], "12");
    assert_eq!(
        body["previous_enrollment"]["promoted_to"],
        body["enrollment"]["id"]
    );
    assert_eq!(
        body["enrollment"]["promoted_from"],
        body["previous_enrollment"]["id"]
    );

    let fees = body["fees"].as_array().unwrap();
    assert_eq!(fees.len(), 13);
    assert_eq!(fees.iter().filter(|f| f["is_monthly"] == true).count(), 12);
    assert!(fees.iter().all(|f| f["status"] == "unpaid"));
    assert_eq!(body["enrollment"]["due_amount"], 6300.0);
    assert_eq!(body["student"]["class_name"], "Class 6");

    let (status, history) = app
        .get(&format!("/students/{}/enrollments", student))
        .await;
    assert_eq!(status, 200);
    let enrollments = history["enrollments"].as_array().unwrap();
    assert_eq!(enrollments.len(), 2);
    assert_eq!(enrollments[0]["class_name"], "Class 6");

    app.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires MongoDB replica set
async fn promotion_of_unknown_student_is_not_found() {
    let app = TestApp::spawn().await;
    let to = app.create_class("Class 6", "06", json!([])).await;

    let (status, body) = app
        .post(
            "/promotions",
            json!({ "student_id": "CII9999999", "new_class_id": to }),
        )
        .await;
    assert_eq!(status, 404);
    assert!(body["error"].as_str().unwrap().contains("not found"));

    app.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires MongoDB replica set
async fn bulk_promotion_collects_per_student_errors() {
    let app = TestApp::spawn().await;
    let from = app.create_class("Class 8", "08", json!([])).await;
    let to = app
        .create_class(
            "Class 9",
            "09",
            json!([{ "fee_type": "Exam Fee", "amount": 400 }]),
        )
        .await;
    let first = admitted_student(&app, "Umar", "01722222222", &from).await;
    let second = admitted_student(&app, "Ali", "01733333333", &from).await;

    let (status, body) = app
        .post(
            "/promotions/bulk",
            json!({
                "students": [
                    { "student_id": first, "new_class_id": to },
                    { "student_id": "CII0000000", "new_class_id": to },
                    { "student_id": second, "new_class_id": "not-an-id" }
                ]
            }),
        )
        .await;
    assert_eq!(status, 200, "{}", body);

    let successful = body["successful"].as_array().unwrap();
    let errors = body["errors"].as_array().unwrap();
    assert_eq!(successful.len(), 1);
    assert_eq!(successful[0]["student"]["student_id"], Value::String(first));
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0]["student_id"], "CII0000000");
    assert_eq!(errors[1]["student_id"], Value::String(second));

    app.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires MongoDB replica set
async fn retention_keeps_class_and_marks_prior_failed() {
    let app = TestApp::spawn().await;
    let class_id = app
        .create_class(
            "Class 4",
            "04",
            json!([{ "fee_type": "Monthly Fee", "amount": 300, "is_monthly": true }]),
        )
        .await;
    let student = admitted_student(&app, "Fatima", "01744444444", &class_id).await;

    let (status, body) = app
        .post(
            "/promotions/retain",
            json!({ "students": [{ "student_id": student }] }),
        )
        .await;
    assert_eq!(status, 200, "{}", body);

    let moved = &body["successful"][0];
    assert_eq!(moved["previous_enrollment"]["status"], "failed");
    assert_eq!(moved["enrollment"]["class_name"], "Class 4");
    assert_eq!(moved["fees"].as_array().unwrap().len(), 12);

    app.cleanup().await;
}
