//! Application startup and lifecycle management.

use axum::{
    middleware::from_fn,
    routing::{get, post, put},
    Router,
};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use service_core::middleware::{metrics_middleware, request_id_middleware, REQUEST_ID_HEADER};
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::EnrollmentConfig;
use crate::handlers;
use crate::services::{
    ClassService, EnrollmentService, LateFeeService, PromotionService, SchoolDb, StudentService,
};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: EnrollmentConfig,
    pub db: SchoolDb,
    pub enrollments: EnrollmentService,
    pub promotions: PromotionService,
    pub late_fees: LateFeeService,
    pub classes: ClassService,
    pub students: StudentService,
}

impl AppState {
    pub fn new(config: EnrollmentConfig, db: SchoolDb) -> Self {
        Self {
            enrollments: EnrollmentService::new(
                db.clone(),
                config.institute.clone(),
                config.fees.clone(),
            ),
            promotions: PromotionService::new(db.clone(), config.fees.clone()),
            late_fees: LateFeeService::new(db.clone()),
            classes: ClassService::new(db.clone()),
            students: StudentService::new(db.clone()),
            config,
            db,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        // Admissions
        .route("/enrollments", post(handlers::enrollments::create_enrollment))
        .route(
            "/enrollments/:id",
            get(handlers::enrollments::get_enrollment)
                .patch(handlers::enrollments::update_enrollment)
                .delete(handlers::enrollments::delete_enrollment),
        )
        // Promotions
        .route("/promotions", post(handlers::promotions::promote_student))
        .route("/promotions/bulk", post(handlers::promotions::bulk_promote))
        .route("/promotions/retain", post(handlers::promotions::bulk_retain))
        // Late fees
        .route("/late-fees/apply", post(handlers::late_fees::apply_late_fees))
        .route(
            "/late-fees/settings",
            get(handlers::late_fees::get_settings).put(handlers::late_fees::update_settings),
        )
        .route("/late-fees/fees/:id", put(handlers::late_fees::customize_fee))
        .route(
            "/late-fees/students/:id",
            put(handlers::late_fees::customize_student),
        )
        // Lookups
        .route("/classes", post(handlers::classes::create_class))
        .route("/classes/:id", get(handlers::classes::get_class))
        .route(
            "/students/:id/enrollments",
            get(handlers::students::enrollment_history),
        )
        .route("/students/:id/fees", get(handlers::students::fee_ledger))
        .route("/receipts/:id", get(handlers::receipts::get_receipt))
        .layer(from_fn(metrics_middleware))
        .layer(from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            }),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Connect to MongoDB, create indexes and bind the listener.
    ///
    /// Port 0 binds a random port, which the tests rely on.
    pub async fn build(config: EnrollmentConfig) -> Result<Self, AppError> {
        let db = SchoolDb::connect(
            config.mongodb.uri.expose_secret(),
            &config.mongodb.database,
        )
        .await?;
        db.initialize_indexes().await?;
        tracing::info!("Database initialized successfully");

        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();
        tracing::info!(port, "Enrollment service listening");

        Ok(Self {
            port,
            listener,
            state: AppState::new(config, db),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn db(&self) -> &SchoolDb {
        &self.state.db
    }

    pub async fn run_until_stopped<F>(self, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let router = build_router(self.state);
        axum::serve(self.listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;
        tracing::info!("Service shutdown complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FeePolicyConfig, InstituteConfig, MongoConfig};
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use secrecy::Secret;
    use serde_json::Value;
    use tower::ServiceExt;

    // The driver connects lazily, so routes that never reach MongoDB can be
    // exercised without a server.
    async fn router() -> Router {
        let config = EnrollmentConfig {
            common: service_core::config::Config::default(),
            mongodb: MongoConfig {
                uri: Secret::new("mongodb://127.0.0.1:1".to_string()),
                database: "router_test".to_string(),
            },
            institute: InstituteConfig {
                name: "Test Madrasa".to_string(),
                address: String::new(),
                phone: String::new(),
            },
            fees: FeePolicyConfig::default(),
        };
        let db = SchoolDb::connect(config.mongodb.uri.expose_secret(), &config.mongodb.database)
            .await
            .unwrap();
        build_router(AppState::new(config, db))
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_service_name() {
        let response = router()
            .await
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
        let body = body_json(response).await;
        assert_eq!(body["service"], "enrollment-service");
    }

    #[tokio::test]
    async fn malformed_admission_gets_structured_failure() {
        let response = router()
            .await
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/enrollments")
                    .header("content-type", "application/json")
                    .body(Body::from("{\"name\": "))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert!(body["message"].as_str().unwrap().starts_with("Invalid request body"));
    }

    #[tokio::test]
    async fn admission_without_name_is_rejected_before_the_database() {
        let response = router()
            .await
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/enrollments")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"class": "Class 1", "fees": []}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert!(body["message"].as_str().unwrap().contains("Student name is required"));
    }

    #[tokio::test]
    async fn malformed_ids_are_bad_requests() {
        let response = router()
            .await
            .oneshot(
                Request::builder()
                    .uri("/enrollments/not-an-id")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
