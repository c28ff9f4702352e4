use crate::{
    auth::AuthUser,
    entities::{BillStatus, TransactionType},
    errors::ServiceError,
    handlers::AppState,
    models::{BillStats, BillView, ExtractedBill},
    storage::{content_type_for_filename, FileUpload},
    ApiResponse, ApiResult,
};
use axum::{
    extract::{Extension, Multipart, Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;
use tracing::{debug, info};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

const FILE_FIELD: &str = "file";
const BILL_TYPE_FIELD: &str = "billType";

/// Multipart form accepted by the upload endpoint
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadBillForm {
    /// Bill image or PDF
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
    /// `purchase` (default) or `sales`
    pub bill_type: Option<TransactionType>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadBillResponse {
    #[schema(example = "Bill processed successfully")]
    pub message: String,
    pub bill_id: Uuid,
    pub data: ExtractedBill,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListBillsQuery {
    /// Maximum number of bills, 1 to 100 (default 10). Non-numeric values use the default.
    #[serde(default, deserialize_with = "lenient_limit")]
    pub limit: Option<u64>,
    /// Embed line items in each bill
    pub include_items: Option<bool>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct StatsQuery {
    /// Window length in days, 1 to 3650 (default 30)
    pub period: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UpdateStatusRequest {
    #[schema(example = "reviewed")]
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeletedBill {
    pub bill_id: Uuid,
    pub deleted: bool,
}

fn lenient_limit<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| value.trim().parse().ok()))
}

/// Routes mounted under `/api/bills`; all of them expect an authenticated caller.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_bills))
        .route("/upload", post(upload_bill))
        .route("/stats/:user_id", get(bill_stats))
        .route("/:bill_id", get(get_bill).delete(delete_bill))
        .route("/:bill_id/download", get(download_bill))
        .route("/:bill_id/status", patch(update_bill_status))
}

#[utoipa::path(
    post,
    path = "/api/bills/upload",
    request_body(content = UploadBillForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Bill extracted and stored", body = UploadBillResponse),
        (status = 400, description = "Missing or unsupported file", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Storage, extraction or persistence failure", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "bills"
)]
pub async fn upload_bill(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    mut multipart: Multipart,
) -> Result<Json<UploadBillResponse>, ServiceError> {
    let mut upload: Option<FileUpload> = None;
    let mut transaction_type = TransactionType::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServiceError::BadRequest(e.body_text()))?
    {
        match field.name() {
            Some(FILE_FIELD) => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field
                    .content_type()
                    .map(str::to_string)
                    .unwrap_or_else(|| content_type_for_filename(&file_name).to_string());
                let bytes: Bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ServiceError::BadRequest(e.body_text()))?;
                upload = Some(FileUpload {
                    file_name,
                    content_type,
                    bytes,
                });
            }
            Some(BILL_TYPE_FIELD) => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| ServiceError::BadRequest(e.body_text()))?;
                let raw = raw.trim();
                if !raw.is_empty() {
                    transaction_type = TransactionType::from_str(raw).map_err(|_| {
                        ServiceError::BadRequest(format!(
                            "Invalid billType '{raw}'; expected 'purchase' or 'sales'"
                        ))
                    })?;
                }
            }
            other => debug!(field = ?other, "ignoring unexpected multipart field"),
        }
    }

    let upload = upload.ok_or_else(|| ServiceError::BadRequest("No file uploaded".into()))?;
    let ingested = state
        .services
        .ingestion
        .ingest(upload, transaction_type, &user)
        .await?;

    Ok(Json(UploadBillResponse {
        message: "Bill processed successfully".into(),
        bill_id: ingested.bill_id,
        data: ingested.data,
    }))
}

#[utoipa::path(
    get,
    path = "/api/bills",
    params(ListBillsQuery),
    responses(
        (status = 200, description = "Bills, newest first", body = ApiResponse<Vec<BillView>>),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "bills"
)]
pub async fn list_bills(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<ListBillsQuery>,
) -> ApiResult<Vec<BillView>> {
    let bills = state
        .services
        .bills
        .list_bills(
            &user.user_id,
            query.limit,
            query.include_items.unwrap_or(false),
        )
        .await?;

    Ok(Json(ApiResponse::success(
        bills.into_iter().map(BillView::from).collect(),
    )))
}

#[utoipa::path(
    get,
    path = "/api/bills/{bill_id}",
    params(("bill_id" = Uuid, Path, description = "Bill ID")),
    responses(
        (status = 200, description = "Bill with its items", body = ApiResponse<BillView>),
        (status = 404, description = "Bill not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "bills"
)]
pub async fn get_bill(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(bill_id): Path<Uuid>,
) -> ApiResult<BillView> {
    let bill = state
        .services
        .bills
        .get_bill(&user.user_id, bill_id)
        .await?;
    Ok(Json(ApiResponse::success(bill.into())))
}

#[utoipa::path(
    get,
    path = "/api/bills/{bill_id}/download",
    params(("bill_id" = Uuid, Path, description = "Bill ID")),
    responses(
        (status = 200, description = "Stored bill file", content_type = "application/octet-stream"),
        (status = 404, description = "Bill not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "File could not be retrieved", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "bills"
)]
pub async fn download_bill(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(bill_id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let download = state
        .services
        .bills
        .download_bill(&user.user_id, bill_id)
        .await?;

    let disposition = format!(
        "attachment; filename=\"{}\"",
        download.filename.replace(['"', '\\'], "_")
    );
    Ok((
        [
            (header::CONTENT_TYPE, download.content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        download.bytes,
    )
        .into_response())
}

#[utoipa::path(
    delete,
    path = "/api/bills/{bill_id}",
    params(("bill_id" = Uuid, Path, description = "Bill ID")),
    responses(
        (status = 200, description = "Bill and items deleted", body = ApiResponse<DeletedBill>),
        (status = 404, description = "Bill not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "bills"
)]
pub async fn delete_bill(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(bill_id): Path<Uuid>,
) -> ApiResult<DeletedBill> {
    state
        .services
        .bills
        .delete_bill(&user.user_id, bill_id)
        .await?;
    info!(bill_id = %bill_id, user_id = %user.user_id, "bill deleted by owner");

    Ok(Json(ApiResponse::success(DeletedBill {
        bill_id,
        deleted: true,
    })))
}

#[utoipa::path(
    patch,
    path = "/api/bills/{bill_id}/status",
    params(("bill_id" = Uuid, Path, description = "Bill ID")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = ApiResponse<BillView>),
        (status = 400, description = "Unknown status", body = crate::errors::ErrorResponse),
        (status = 404, description = "Bill not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "bills"
)]
pub async fn update_bill_status(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(bill_id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> ApiResult<BillView> {
    let status = BillStatus::from_str(payload.status.trim()).map_err(|_| {
        ServiceError::BadRequest(format!(
            "Invalid status '{}'; expected processed, reviewed, flagged or archived",
            payload.status
        ))
    })?;

    let bill = state
        .services
        .bills
        .update_status(&user.user_id, bill_id, status)
        .await?;
    Ok(Json(ApiResponse::success(bill.into())))
}

#[utoipa::path(
    get,
    path = "/api/bills/stats/{user_id}",
    params(
        ("user_id" = String, Path, description = "Must be the authenticated user"),
        StatsQuery
    ),
    responses(
        (status = 200, description = "Aggregates over the window", body = BillStats),
        (status = 400, description = "Period out of range", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not the caller's statistics", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "bills"
)]
pub async fn bill_stats(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(user_id): Path<String>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<BillStats>, ServiceError> {
    if user_id != user.user_id {
        return Err(ServiceError::NotFound(format!(
            "Statistics for user {user_id} not found"
        )));
    }

    let stats = state
        .services
        .bills
        .get_stats(&user.user_id, query.period)
        .await?;
    Ok(Json(stats))
}
