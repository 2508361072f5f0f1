//! Test helpers for enrollment-service integration tests.
//!
//! Transactions need a replica set; point `TEST_MONGODB_URI` at one.

#![allow(dead_code)]

use enrollment_service::config::{
    EnrollmentConfig, FeePolicyConfig, InstituteConfig, MongoConfig,
};
use enrollment_service::Application;
use secrecy::Secret;
use serde_json::{json, Value};
use std::time::Duration;
use uuid::Uuid;

const DEFAULT_TEST_URI: &str = "mongodb://localhost:27017/?replicaSet=rs0";

pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
    database: mongodb::Database,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let uri = std::env::var("TEST_MONGODB_URI").unwrap_or_else(|_| DEFAULT_TEST_URI.to_string());
        let database = format!("enrollment_test_{}", Uuid::new_v4().simple());

        let config = EnrollmentConfig {
            common: service_core::config::Config {
                port: 0,
                ..Default::default()
            },
            mongodb: MongoConfig {
                uri: Secret::new(uri),
                database,
            },
            institute: InstituteConfig {
                name: "Test Madrasa".to_string(),
                address: "Dhaka".to_string(),
                phone: "01700000000".to_string(),
            },
            fees: FeePolicyConfig::default(),
        };

        let application = Application::build(config)
            .await
            .expect("Failed to build application");
        let address = format!("http://127.0.0.1:{}", application.port());
        let database = application.db().database().clone();
        tokio::spawn(application.run_until_stopped(std::future::pending()));

        let app = Self {
            address,
            client: reqwest::Client::new(),
            database,
        };
        app.wait_until_ready().await;
        app
    }

    async fn wait_until_ready(&self) {
        for _ in 0..50 {
            if let Ok(response) = self.client.get(self.url("/health")).send().await {
                if response.status().is_success() {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        panic!("Test server did not become ready");
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub async fn get(&self, path: &str) -> (u16, Value) {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .expect("Failed to execute request");
        read(response).await
    }

    pub async fn send(&self, method: reqwest::Method, path: &str, body: Value) -> (u16, Value) {
        let response = self
            .client
            .request(method, self.url(path))
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request");
        read(response).await
    }

    pub async fn post(&self, path: &str, body: Value) -> (u16, Value) {
        self.send(reqwest::Method::POST, path, body).await
    }

    pub async fn put(&self, path: &str, body: Value) -> (u16, Value) {
        self.send(reqwest::Method::PUT, path, body).await
    }

    pub async fn patch(&self, path: &str, body: Value) -> (u16, Value) {
        self.send(reqwest::Method::PATCH, path, body).await
    }

    pub async fn delete(&self, path: &str) -> (u16, Value) {
        let response = self
            .client
            .delete(self.url(path))
            .send()
            .await
            .expect("Failed to execute request");
        read(response).await
    }

    /// Create a class and return its id.
    pub async fn create_class(&self, name: &str, code: &str, fee_structure: Value) -> String {
        let (status, body) = self
            .post(
                "/classes",
                json!({ "name": name, "code": code, "fee_structure": fee_structure }),
            )
            .await;
        assert_eq!(status, 201, "create class failed: {}", body);
        body["id"].as_str().expect("class id").to_string()
    }

    /// Admit a student and return the `data` part of the response.
    pub async fn admit(&self, payload: Value) -> Value {
        let (status, body) = self.post("/enrollments", payload).await;
        assert_eq!(status, 201, "admission failed: {}", body);
        assert_eq!(body["success"], true);
        body["data"].clone()
    }

    pub async fn cleanup(&self) {
        self.database
            .drop(None)
            .await
            .expect("Failed to drop test database");
    }
}

async fn read(response: reqwest::Response) -> (u16, Value) {
    let status = response.status().as_u16();
    let body = response.json::<Value>().await.unwrap_or(Value::Null);
    (status, body)
}
