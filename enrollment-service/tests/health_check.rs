mod common;

use common::TestApp;

#[tokio::test]
#[ignore] // Requires MongoDB replica set
async fn health_and_readiness_return_200() {
    let app = TestApp::spawn().await;

    let (status, body) = app.get("/health").await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "enrollment-service");

    let (status, body) = app.get("/ready").await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ready");

    app.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires MongoDB replica set
async fn metrics_endpoint_serves_text() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .get(app.url("/metrics"))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 200);

    app.cleanup().await;
}
