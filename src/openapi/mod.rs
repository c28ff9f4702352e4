use crate::handlers::AppState;
use axum::{routing::get, Json, Router};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

pub const OPENAPI_JSON_PATH: &str = "/api-docs/openapi.json";

#[derive(OpenApi)]
#[openapi(
    info(
        title = "ProfitPilot API",
        description = r#"
# ProfitPilot bill ingestion API

Upload bill images or PDFs, have the extraction workflow read them, and query
the normalized bills, their line items and GST aggregates.

## Authentication

Every `/api/bills` endpoint expects the identity provider's access token:

```
Authorization: Bearer <access-token>
```

## Errors

Failures share one body shape:

```json
{
  "error": "Not Found",
  "message": "Not found: Bill 550e8400-e29b-41d4-a716-446655440000 not found",
  "request_id": "req-abc123xyz",
  "timestamp": "2026-01-09T10:30:00Z"
}
```
        "#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "http://localhost:5000", description = "Local development")
    ),
    tags(
        (name = "bills", description = "Bill upload, retrieval and statistics"),
        (name = "health", description = "Liveness and readiness probes")
    ),
    paths(
        crate::handlers::bills::upload_bill,
        crate::handlers::bills::list_bills,
        crate::handlers::bills::get_bill,
        crate::handlers::bills::download_bill,
        crate::handlers::bills::delete_bill,
        crate::handlers::bills::update_bill_status,
        crate::handlers::bills::bill_stats,
        crate::handlers::health::liveness_check,
        crate::handlers::health::readiness_check,
    ),
    components(
        schemas(
            crate::models::BillView,
            crate::models::BillItemView,
            crate::models::BillStats,
            crate::models::ExtractedBill,
            crate::models::ExtractedItem,
            crate::models::Party,
            crate::entities::TransactionType,
            crate::entities::BillStatus,
            crate::handlers::bills::UploadBillForm,
            crate::handlers::bills::UploadBillResponse,
            crate::handlers::bills::UpdateStatusRequest,
            crate::handlers::bills::DeletedBill,
            crate::handlers::health::HealthResponse,
            crate::errors::ErrorResponse
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Serves the generated document as JSON
pub fn routes() -> Router<AppState> {
    Router::new().route(OPENAPI_JSON_PATH, get(|| async { Json(ApiDoc::openapi()) }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_bill_routes_and_security() {
        let json = serde_json::to_string_pretty(&ApiDoc::openapi()).unwrap();
        assert!(json.contains("ProfitPilot API"));
        assert!(json.contains("/api/bills/upload"));
        assert!(json.contains("/api/bills/stats/{user_id}"));
        assert!(json.contains("bearer_auth"));
    }
}
