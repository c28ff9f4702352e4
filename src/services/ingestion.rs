use crate::{
    auth::{AuthUser, HandoffSubject, HandoffTokenIssuer},
    db::DbPool,
    entities::{bill, bill_item, BillStatus, TransactionType},
    errors::ServiceError,
    models::{ExtractedBill, ExtractionResponse, ExtractionShapeError, IngestedBill},
    storage::{FileUpload, StorageError, StorageGateway, StoredObject},
    tracing::timed_stage,
    workflow::{ExtractionRequest, ExtractionWorkflow},
};
use chrono::Utc;
use metrics::counter;
use sea_orm::{ActiveModelTrait, EntityTrait, Set, TransactionTrait};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Drives one upload from raw file to persisted bill
#[derive(Clone)]
pub struct IngestionService {
    db_pool: Arc<DbPool>,
    storage: StorageGateway,
    issuer: Arc<HandoffTokenIssuer>,
    workflow: Arc<dyn ExtractionWorkflow>,
}

impl IngestionService {
    pub fn new(
        db_pool: Arc<DbPool>,
        storage: StorageGateway,
        issuer: Arc<HandoffTokenIssuer>,
        workflow: Arc<dyn ExtractionWorkflow>,
    ) -> Self {
        Self {
            db_pool,
            storage,
            issuer,
            workflow,
        }
    }

    /// Stores the file, runs extraction and persists the normalized bill.
    ///
    /// Nothing is written to the database unless extraction produced a usable
    /// response; header and items are committed together. The stored file is
    /// not removed when a later stage fails.
    #[instrument(skip(self, upload, user), fields(user_id = %user.user_id, file_name = %upload.file_name, transaction_type = %transaction_type))]
    pub async fn ingest(
        &self,
        upload: FileUpload,
        transaction_type: TransactionType,
        user: &AuthUser,
    ) -> Result<IngestedBill, ServiceError> {
        if upload.bytes.is_empty() {
            return Err(StorageError::EmptyPayload.into());
        }

        let stored = timed_stage("storage", self.storage.store(&upload, &user.user_id)).await?;

        // The workflow locates the object in the bucket by its key
        let token = self.issuer.issue(&HandoffSubject {
            user_id: user.user_id.clone(),
            user_email: user.email_or_empty().to_string(),
            file_name: stored.key.clone(),
            file_url: stored.public_url.clone(),
        })?;

        let request = ExtractionRequest {
            file_url: stored.public_url.clone(),
            file_name: stored.key.clone(),
            file_type: upload.content_type.clone(),
            user_id: user.user_id.clone(),
            user_email: user.email_or_empty().to_string(),
        };
        let raw = timed_stage("extraction", self.workflow.extract(&request, &token)).await?;

        let unusable = |e: ExtractionShapeError| {
            warn!(error = %e, "unusable extraction response");
            ServiceError::ExtractionError(e.to_string())
        };
        let response = ExtractionResponse::resolve(&raw).map_err(unusable)?;
        let data = response
            .normalize(Utc::now().date_naive())
            .map_err(unusable)?;

        let bill_id = timed_stage(
            "persistence",
            self.persist(&stored, &upload, transaction_type, user, &data, raw),
        )
        .await?;

        counter!(
            "profitpilot_bills_ingested_total",
            1,
            "transaction_type" => transaction_type.to_string(),
            "shape" => response.shape()
        );
        info!(bill_id = %bill_id, items = data.items.len(), "bill ingested");

        Ok(IngestedBill { bill_id, data })
    }

    async fn persist(
        &self,
        stored: &StoredObject,
        upload: &FileUpload,
        transaction_type: TransactionType,
        user: &AuthUser,
        data: &ExtractedBill,
        raw: Value,
    ) -> Result<Uuid, ServiceError> {
        let now = Utc::now();
        let bill_id = Uuid::new_v4();

        let header = bill::ActiveModel {
            id: Set(bill_id),
            user_id: Set(user.user_id.clone()),
            file_key: Set(stored.key.clone()),
            file_url: Set(stored.public_url.clone()),
            file_name: Set(upload.file_name.clone()),
            content_type: Set(upload.content_type.clone()),
            invoice_number: Set(data.invoice_number.clone()),
            invoice_date: Set(data.invoice_date),
            seller_name: Set(data.seller.name.clone()),
            seller_address: Set(data.seller.address.clone()),
            seller_gstin: Set(data.seller.gstin.clone()),
            buyer_name: Set(data.buyer.name.clone()),
            buyer_address: Set(data.buyer.address.clone()),
            buyer_gstin: Set(data.buyer.gstin.clone()),
            total_amount: Set(data.total_amount),
            gst_amount: Set(data.gst_amount),
            transaction_type: Set(transaction_type),
            category: Set(data.category.clone()),
            status: Set(BillStatus::Processed),
            raw_data: Set(raw),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let items: Vec<bill_item::ActiveModel> = data
            .items
            .iter()
            .map(|item| bill_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                bill_id: Set(bill_id),
                description: Set(item.description.clone()),
                quantity: Set(item.quantity),
                unit_price: Set(item.unit_price),
                amount: Set(item.amount),
                gst_rate: Set(item.gst_rate),
                category: Set(item.category.clone()),
                created_at: Set(now),
            })
            .collect();

        // Dropping the transaction without commit rolls back the header
        let txn = self.db_pool.begin().await?;
        header.insert(&txn).await?;
        if !items.is_empty() {
            bill_item::Entity::insert_many(items)
                .exec_without_returning(&txn)
                .await?;
        }
        txn.commit().await?;

        Ok(bill_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{establish_connection_with_config, run_migrations, DbConfig};
    use crate::storage::InMemoryStorage;
    use crate::workflow::WorkflowError;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use bytes::Bytes;
    use mockall::mock;
    use rust_decimal_macros::dec;
    use sea_orm::{ColumnTrait, ModelTrait, PaginatorTrait, QueryFilter};
    use serde_json::json;
    use std::time::Duration;

    mock! {
        Workflow {}

        #[async_trait]
        impl ExtractionWorkflow for Workflow {
            async fn extract(
                &self,
                request: &ExtractionRequest,
                handoff_token: &str,
            ) -> Result<Value, WorkflowError>;
        }
    }

    const SECRET: &str = "Xk29!pQ7rT4vW8zL1mN6bC3dF5gH0jKs";

    async fn memory_db() -> Arc<DbPool> {
        let pool = establish_connection_with_config(&DbConfig {
            url: "sqlite::memory:".into(),
            max_connections: 1,
            ..Default::default()
        })
        .await
        .unwrap();
        run_migrations(&pool).await.unwrap();
        Arc::new(pool)
    }

    fn user() -> AuthUser {
        AuthUser {
            user_id: "user-1".into(),
            email: Some("owner@example.com".into()),
        }
    }

    fn pdf() -> FileUpload {
        FileUpload {
            file_name: "invoice.pdf".into(),
            content_type: "application/pdf".into(),
            bytes: Bytes::from_static(b"%PDF-1.7 test"),
        }
    }

    fn service(
        db: Arc<DbPool>,
        storage: Arc<InMemoryStorage>,
        workflow: MockWorkflow,
    ) -> IngestionService {
        let issuer =
            HandoffTokenIssuer::new(SECRET, "profitpilot-backend", "n8n", Duration::from_secs(300))
                .unwrap();
        IngestionService::new(
            db,
            StorageGateway::new(storage, 5 * 1024 * 1024),
            Arc::new(issuer),
            Arc::new(workflow),
        )
    }

    #[tokio::test]
    async fn sales_invoice_is_persisted_with_recomputed_items() {
        let db = memory_db().await;
        let storage = Arc::new(InMemoryStorage::new("bills"));
        let mut workflow = MockWorkflow::new();
        workflow
            .expect_extract()
            .withf(|request, token| {
                request.user_id == "user-1"
                    && request.file_name.starts_with("user-1/")
                    && request.file_name.ends_with("_invoice.pdf")
                    && request.file_type == "application/pdf"
                    && request.file_url.starts_with("memory://bills/user-1/")
                    && !token.is_empty()
            })
            .times(1)
            .returning(|_, _| {
                Ok(json!({
                    "invoice": {"invoiceNo": "INV-7", "invoiceDate": "15/03/2025"},
                    "seller": {"name": "Acme Traders", "gstin": "27AAPFU0939F1ZV"},
                    "totalAmount": 1180.00,
                    "gstAmount": "180.00",
                    "items": [
                        {"description": "Widget", "quantity": 2, "unitPrice": 500, "amount": 999, "gstRate": 18},
                        {"description": "Freight", "quantity": 1, "unitPrice": "180"}
                    ]
                }))
            });

        let ingested = service(db.clone(), storage.clone(), workflow)
            .ingest(pdf(), TransactionType::Sales, &user())
            .await
            .unwrap();

        assert_eq!(ingested.data.invoice_number, "INV-7");
        assert_eq!(storage.object_count().await, 1);

        let stored = bill::Entity::find_by_id(ingested.bill_id)
            .one(&*db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.transaction_type, TransactionType::Sales);
        assert_eq!(stored.total_amount, dec!(1180.00));
        assert_eq!(stored.gst_amount, dec!(180.00));
        assert_eq!(stored.status, BillStatus::Processed);
        assert!(stored.file_key.starts_with("user-1/"));
        assert_eq!(stored.raw_data["invoice"]["invoiceNo"], json!("INV-7"));

        let mut amounts: Vec<_> = stored
            .find_related(bill_item::Entity)
            .all(&*db)
            .await
            .unwrap()
            .into_iter()
            .map(|item| {
                assert_eq!(item.amount, item.quantity * item.unit_price);
                item.amount
            })
            .collect();
        amounts.sort();
        assert_eq!(amounts, vec![dec!(180), dec!(1000)]);
    }

    #[tokio::test]
    async fn non_object_response_persists_nothing() {
        let db = memory_db().await;
        let storage = Arc::new(InMemoryStorage::new("bills"));
        let mut workflow = MockWorkflow::new();
        workflow
            .expect_extract()
            .times(1)
            .returning(|_, _| Ok(json!(["not", "an", "object"])));

        let result = service(db.clone(), storage.clone(), workflow)
            .ingest(pdf(), TransactionType::Purchase, &user())
            .await;

        assert_matches!(result, Err(ServiceError::ExtractionError(_)));
        assert_eq!(bill::Entity::find().count(&*db).await.unwrap(), 0);
        // the file itself stays in storage
        assert_eq!(storage.object_count().await, 1);
    }

    #[tokio::test]
    async fn overflowing_item_amount_persists_nothing() {
        let db = memory_db().await;
        let storage = Arc::new(InMemoryStorage::new("bills"));
        let mut workflow = MockWorkflow::new();
        workflow.expect_extract().times(1).returning(|_, _| {
            Ok(json!({
                "totalAmount": 100,
                "items": [{"quantity": "10000000000000000", "unitPrice": "10000000000000000"}]
            }))
        });

        let result = service(db.clone(), storage.clone(), workflow)
            .ingest(pdf(), TransactionType::Purchase, &user())
            .await;

        assert_matches!(result, Err(ServiceError::ExtractionError(msg)) if msg.contains("overflows"));
        assert_eq!(bill::Entity::find().count(&*db).await.unwrap(), 0);
        assert_eq!(bill_item::Entity::find().count(&*db).await.unwrap(), 0);
        assert_eq!(storage.object_count().await, 1);
    }

    #[tokio::test]
    async fn workflow_failure_persists_nothing() {
        let db = memory_db().await;
        let storage = Arc::new(InMemoryStorage::new("bills"));
        let mut workflow = MockWorkflow::new();
        workflow
            .expect_extract()
            .times(1)
            .returning(|_, _| Err(WorkflowError::Timeout(Duration::from_secs(120))));

        let result = service(db.clone(), storage, workflow)
            .ingest(pdf(), TransactionType::Purchase, &user())
            .await;

        assert_matches!(result, Err(ServiceError::ExtractionError(_)));
        assert_eq!(
            bill::Entity::find()
                .filter(bill::Column::UserId.eq("user-1"))
                .count(&*db)
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn rejected_uploads_never_reach_storage_or_workflow() {
        let db = memory_db().await;
        let storage = Arc::new(InMemoryStorage::new("bills"));
        let mut workflow = MockWorkflow::new();
        workflow.expect_extract().times(0);
        let service = service(db, storage.clone(), workflow);

        let empty = FileUpload {
            bytes: Bytes::new(),
            ..pdf()
        };
        assert_matches!(
            service.ingest(empty, TransactionType::Purchase, &user()).await,
            Err(ServiceError::BadRequest(msg)) if msg == "No file uploaded"
        );

        let text = FileUpload {
            file_name: "notes.txt".into(),
            content_type: "text/plain".into(),
            bytes: Bytes::from_static(b"hello"),
        };
        assert_matches!(
            service.ingest(text, TransactionType::Purchase, &user()).await,
            Err(ServiceError::BadRequest(_))
        );
        assert_eq!(storage.uploads(), 0);
    }

    #[tokio::test]
    async fn wrapped_response_with_empty_items_stores_header_only() {
        let db = memory_db().await;
        let storage = Arc::new(InMemoryStorage::new("bills"));
        let mut workflow = MockWorkflow::new();
        workflow.expect_extract().times(1).returning(|_, _| {
            Ok(json!({"output": {"totalAmount": 590, "gstAmount": 90, "items": []}}))
        });

        let ingested = service(db.clone(), storage, workflow)
            .ingest(pdf(), TransactionType::Purchase, &user())
            .await
            .unwrap();

        assert_eq!(ingested.data.total_amount, dec!(590));
        assert!(ingested.data.items.is_empty());
        assert_eq!(bill_item::Entity::find().count(&*db).await.unwrap(), 0);
        assert_eq!(bill::Entity::find().count(&*db).await.unwrap(), 1);
    }
}
