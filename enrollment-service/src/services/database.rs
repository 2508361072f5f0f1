use crate::models::{
    Enrollment, Fee, LateFeeRun, LateFeeSettings, Payment, Receipt, SchoolClass, Student,
};
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, Document},
    options::{FindOneAndUpdateOptions, FindOptions, IndexOptions, ReturnDocument},
    Client as MongoClient, ClientSession, Collection, Database, IndexModel,
};
use serde::de::DeserializeOwned;
use service_core::error::AppError;

use super::error::ServiceError;

#[derive(Clone)]
pub struct SchoolDb {
    client: MongoClient,
    db: Database,
}

impl SchoolDb {
    pub async fn connect(uri: &str, database: &str) -> Result<Self, AppError> {
        tracing::info!("Connecting to MongoDB");
        let client = MongoClient::with_uri_str(uri).await.map_err(|e| {
            tracing::error!("Failed to connect to MongoDB: {}", e);
            AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
        })?;
        let db = client.database(database);
        tracing::info!(database = %database, "Successfully connected to MongoDB database");
        Ok(Self { client, db })
    }

    pub async fn initialize_indexes(&self) -> Result<(), AppError> {
        tracing::info!("Creating MongoDB indexes for enrollment-service");

        // Human-readable student id is the upsert key for admissions
        let student_id_index = IndexModel::builder()
            .keys(doc! { "student_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("student_id_idx".to_string())
                    .unique(true)
                    .build(),
            )
            .build();
        create_index(&self.students(), student_id_index, "student_id").await?;

        let mobile_index = IndexModel::builder()
            .keys(doc! { "mobile": 1 })
            .options(
                IndexOptions::builder()
                    .name("mobile_idx".to_string())
                    .sparse(true)
                    .build(),
            )
            .build();
        create_index(&self.students(), mobile_index, "mobile").await?;

        // At most one active enrollment per (student, class). Free-text
        // classes have no ids, so the name is part of the key.
        let active_enrollment_index = IndexModel::builder()
            .keys(active_enrollment_keys())
            .options(
                IndexOptions::builder()
                    .name("active_enrollment_class_idx".to_string())
                    .unique(true)
                    .partial_filter_expression(doc! { "status": "active" })
                    .build(),
            )
            .build();
        create_index(&self.enrollments(), active_enrollment_index, "active enrollment").await?;

        let student_history_index = IndexModel::builder()
            .keys(doc! { "student": 1, "created_at": -1 })
            .options(
                IndexOptions::builder()
                    .name("student_created_at_idx".to_string())
                    .build(),
            )
            .build();
        create_index(&self.enrollments(), student_history_index, "enrollment history").await?;

        let fee_indexes = [
            ("enrollment_idx", doc! { "enrollment": 1 }),
            ("student_idx", doc! { "student": 1 }),
            ("status_due_date_idx", doc! { "status": 1, "due_date": 1 }),
            ("parent_fee_idx", doc! { "parent_fee": 1 }),
        ];
        for (name, keys) in fee_indexes {
            let index = IndexModel::builder()
                .keys(keys)
                .options(IndexOptions::builder().name(name.to_string()).build())
                .build();
            create_index(&self.fees(), index, name).await?;
        }

        let receipt_no_index = IndexModel::builder()
            .keys(doc! { "receipt_no": 1 })
            .options(
                IndexOptions::builder()
                    .name("receipt_no_idx".to_string())
                    .unique(true)
                    .build(),
            )
            .build();
        create_index(&self.receipts(), receipt_no_index, "receipt_no").await?;

        let payment_fees_index = IndexModel::builder()
            .keys(doc! { "fees": 1 })
            .options(
                IndexOptions::builder()
                    .name("fees_idx".to_string())
                    .build(),
            )
            .build();
        create_index(&self.payments(), payment_fees_index, "payment fees").await?;

        tracing::info!("Successfully created all MongoDB indexes");
        Ok(())
    }

    pub async fn health_check(&self) -> Result<(), AppError> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e.to_string())))?;
        Ok(())
    }

    pub fn client(&self) -> &MongoClient {
        &self.client
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn students(&self) -> Collection<Student> {
        self.db.collection("students")
    }

    pub fn classes(&self) -> Collection<SchoolClass> {
        self.db.collection("classes")
    }

    pub fn enrollments(&self) -> Collection<Enrollment> {
        self.db.collection("enrollments")
    }

    pub fn fees(&self) -> Collection<Fee> {
        self.db.collection("fees")
    }

    pub fn payments(&self) -> Collection<Payment> {
        self.db.collection("payments")
    }

    pub fn receipts(&self) -> Collection<Receipt> {
        self.db.collection("receipts")
    }

    pub fn settings(&self) -> Collection<LateFeeSettings> {
        self.db.collection("settings")
    }

    pub fn late_fee_runs(&self) -> Collection<LateFeeRun> {
        self.db.collection("late_fee_runs")
    }

    fn counters(&self) -> Collection<Document> {
        self.db.collection("counters")
    }

    /// Atomically increment and return a named sequence.
    pub async fn next_sequence(
        &self,
        name: &str,
        session: &mut ClientSession,
    ) -> Result<i64, ServiceError> {
        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();

        let counter = self
            .counters()
            .find_one_and_update_with_session(
                doc! { "_id": name },
                doc! { "$inc": { "seq": 1_i64 } },
                options,
                session,
            )
            .await?
            .ok_or_else(|| anyhow::anyhow!("Counter {} was not created", name))?;

        counter
            .get_i64("seq")
            .or_else(|_| counter.get_i32("seq").map(i64::from))
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Counter {}: {}", name, e)))
    }
}

pub fn active_enrollment_keys() -> Document {
    doc! { "student": 1, "class_ids": 1, "class_name": 1 }
}

async fn create_index<T>(
    collection: &Collection<T>,
    index: IndexModel,
    label: &str,
) -> Result<(), AppError> {
    collection.create_index(index, None).await.map_err(|e| {
        tracing::error!("Failed to create {} index: {}", label, e);
        AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
    })?;
    Ok(())
}

/// Collect every document matching `filter` inside the session.
pub async fn find_all<T>(
    collection: &Collection<T>,
    filter: Document,
    sort: Option<Document>,
    session: &mut ClientSession,
) -> Result<Vec<T>, ServiceError>
where
    T: DeserializeOwned + Unpin + Send + Sync,
{
    let options = sort.map(|s| FindOptions::builder().sort(s).build());
    let mut cursor = collection
        .find_with_session(filter, options, session)
        .await?;
    let items = cursor.stream(session).try_collect().await?;
    Ok(items)
}

/// Same as [`find_all`] without a session, for read-only endpoints.
pub async fn find_all_unscoped<T>(
    collection: &Collection<T>,
    filter: Document,
    sort: Option<Document>,
) -> Result<Vec<T>, ServiceError>
where
    T: DeserializeOwned + Unpin + Send + Sync,
{
    let options = sort.map(|s| FindOptions::builder().sort(s).build());
    let cursor = collection.find(filter, options).await?;
    let items = cursor.try_collect().await?;
    Ok(items)
}
