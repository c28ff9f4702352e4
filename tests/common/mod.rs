#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use profitpilot_api::{
    app_router,
    auth::{HandoffTokenIssuer, SupabaseIdentity},
    config::AppConfig,
    db::{self, DbConfig},
    entities::{bill, BillStatus, TransactionType},
    handlers::AppServices,
    storage::{memory::InMemoryStorage, StorageGateway},
    workflow::N8nWorkflowClient,
    AppState,
};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::{
    matchers::{header, method, path},
    Mock, MockServer, ResponseTemplate,
};

pub const USER_TOKEN: &str = "token-for-asha";
pub const USER_ID: &str = "2f1c7e3a-6b0d-4c55-9d7e-1a2b3c4d5e6f";
pub const USER_EMAIL: &str = "asha@traders.in";

pub const OTHER_TOKEN: &str = "token-for-vikram";
pub const OTHER_USER_ID: &str = "9a8b7c6d-5e4f-4a3b-8c2d-1e0f9a8b7c6d";

pub const WEBHOOK_PATH: &str = "/webhook/bill-extract";
const HANDOFF_SECRET: &str = "Xk29!pQ7rT4vW8zL1mN6bC3dF5gH0jKs";
const BOUNDARY: &str = "----profitpilot-test-boundary";

/// A fully wired application backed by a scratch sqlite file and in-memory storage, with
/// the identity provider and extraction workflow served by mock servers.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub storage: Arc<InMemoryStorage>,
    pub identity: MockServer,
    pub n8n: MockServer,
    _db_dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_extraction_timeout(Duration::from_secs(5)).await
    }

    pub async fn with_extraction_timeout(timeout: Duration) -> Self {
        let identity = MockServer::start().await;
        mount_identity(&identity, USER_TOKEN, USER_ID, Some(USER_EMAIL)).await;
        mount_identity(&identity, OTHER_TOKEN, OTHER_USER_ID, None).await;
        Mock::given(method("GET"))
            .and(path("/auth/v1/user"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({ "msg": "invalid JWT" })),
            )
            .with_priority(10)
            .mount(&identity)
            .await;

        let n8n = MockServer::start().await;

        let db_dir = TempDir::new().expect("temp dir for sqlite");
        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_dir.path().join("bills.db").display()),
            identity.uri(),
            "service-role-key".to_string(),
            format!("{}{}", n8n.uri(), WEBHOOK_PATH),
            HANDOFF_SECRET.to_string(),
        );
        cfg.storage_backend = "memory".to_string();
        cfg.max_upload_bytes = 64 * 1024;

        let pool = db::establish_connection_with_config(&DbConfig::from(&cfg))
            .await
            .expect("connect to sqlite");
        db::run_migrations(&pool).await.expect("run migrations");
        let db = Arc::new(pool);

        let storage = Arc::new(InMemoryStorage::new(cfg.storage_bucket.clone()));
        let gateway = StorageGateway::new(storage.clone(), cfg.max_upload_bytes);
        let issuer = Arc::new(HandoffTokenIssuer::from_config(&cfg).expect("handoff issuer"));
        let workflow = Arc::new(N8nWorkflowClient::new(
            reqwest::Client::new(),
            cfg.n8n_webhook_url.clone(),
            timeout,
        ));
        let identity_provider = Arc::new(SupabaseIdentity::new(
            reqwest::Client::new(),
            &cfg.supabase_url,
            cfg.supabase_service_key.clone(),
        ));

        let services = AppServices::new(db.clone(), gateway, issuer, workflow, &cfg);
        let state = AppState {
            db,
            config: cfg,
            services,
            identity: identity_provider,
        };

        Self {
            router: app_router(state.clone()),
            state,
            storage,
            identity,
            n8n,
            _db_dir: db_dir,
        }
    }

    /// Answers every extraction call with `body`
    pub async fn mock_extraction(&self, body: Value) {
        Mock::given(method("POST"))
            .and(path(WEBHOOK_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.n8n)
            .await;
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Convenience helper for requests as the default user.
    pub async fn request_authenticated(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> Response {
        self.request(method, uri, body, Some(USER_TOKEN)).await
    }

    /// Multipart upload to `/api/bills/upload`
    pub async fn upload(
        &self,
        token: Option<&str>,
        file: Option<(&str, &str, &[u8])>,
        bill_type: Option<&str>,
    ) -> Response {
        let mut body: Vec<u8> = Vec::new();
        if let Some(bill_type) = bill_type {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"billType\"\r\n\r\n{bill_type}\r\n"
                )
                .as_bytes(),
            );
        }
        if let Some((file_name, content_type, bytes)) = file {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("/api/bills/upload")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            );
        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let request = builder.body(Body::from(body)).expect("failed to build upload");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during upload")
    }

    /// Inserts a bill directly, bypassing ingestion
    pub async fn seed_bill(
        &self,
        user_id: &str,
        transaction_type: TransactionType,
        total_amount: Decimal,
        gst_amount: Decimal,
        created_at: DateTime<Utc>,
    ) -> bill::Model {
        let id = Uuid::new_v4();
        bill::ActiveModel {
            id: Set(id),
            user_id: Set(user_id.to_string()),
            file_key: Set(format!("{user_id}/seeded_{id}.pdf")),
            file_url: Set(format!("memory://bills/{user_id}/seeded_{id}.pdf")),
            file_name: Set("seeded.pdf".to_string()),
            content_type: Set("application/pdf".to_string()),
            invoice_number: Set(format!("SEED-{}", &id.simple().to_string()[..6])),
            invoice_date: Set(NaiveDate::from_ymd_opt(2025, 4, 1).expect("valid date")),
            seller_name: Set("Seeded Seller".to_string()),
            seller_address: Set(String::new()),
            seller_gstin: Set(String::new()),
            buyer_name: Set("Seeded Buyer".to_string()),
            buyer_address: Set(String::new()),
            buyer_gstin: Set(String::new()),
            total_amount: Set(total_amount),
            gst_amount: Set(gst_amount),
            transaction_type: Set(transaction_type),
            category: Set("uncategorized".to_string()),
            status: Set(BillStatus::Processed),
            raw_data: Set(json!({})),
            created_at: Set(created_at),
            updated_at: Set(created_at),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed bill")
    }
}

async fn mount_identity(server: &MockServer, token: &str, user_id: &str, email: Option<&str>) {
    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .and(header("authorization", format!("Bearer {token}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": user_id,
            "email": email,
            "aud": "authenticated",
        })))
        .with_priority(1)
        .mount(server)
        .await;
}

pub async fn body_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    serde_json::from_slice(&bytes).expect("response body is json")
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body")
        .to_vec()
}

/// The extraction payload for a two-line sales invoice
pub fn sales_invoice() -> Value {
    json!({
        "invoice": { "invoiceNo": "INV/2025/0042", "invoiceDate": "15/04/2025" },
        "seller": {
            "name": "Asha Traders",
            "address": "12 MG Road, Bengaluru",
            "gstin": "29ABCDE1234F1Z5"
        },
        "buyer": {
            "name": "Kaveri Stores",
            "address": "4 Market Street, Mysuru",
            "gstin": "29PQRSX6789K1Z2"
        },
        "totalAmount": 1180,
        "gstAmount": 180,
        "category": "groceries",
        "items": [
            {
                "description": "Basmati rice 25kg",
                "quantity": 2,
                "unitPrice": 500,
                "amount": 999,
                "gstRate": 5,
                "category": "groceries"
            },
            {
                "description": "Freight",
                "quantity": "1",
                "unitPrice": "180"
            }
        ]
    })
}

pub const PDF_BYTES: &[u8] = b"%PDF-1.4\n1 0 obj << /Type /Catalog >> endobj\n%%EOF\n";
