use crate::{
    db::DbPool,
    entities::{bill, bill_item, BillStatus, TransactionType},
    errors::ServiceError,
    models::{BillDownload, BillStats, BillWithItems},
    storage::{content_type_for_filename, filename_from_key, StorageGateway},
};
use chrono::{Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, LoaderTrait, ModelTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

pub const MAX_LIST_LIMIT: u64 = 100;
pub const MAX_STATS_PERIOD_DAYS: u32 = 3650;

/// Read, aggregate and lifecycle operations on a user's bills
#[derive(Clone)]
pub struct BillService {
    db_pool: Arc<DbPool>,
    storage: StorageGateway,
    default_list_limit: u64,
    default_period_days: u32,
}

impl BillService {
    pub fn new(
        db_pool: Arc<DbPool>,
        storage: StorageGateway,
        default_list_limit: u64,
        default_period_days: u32,
    ) -> Self {
        Self {
            db_pool,
            storage,
            default_list_limit,
            default_period_days,
        }
    }

    /// Most recent bills first. Items are only loaded when asked for.
    #[instrument(skip(self))]
    pub async fn list_bills(
        &self,
        user_id: &str,
        limit: Option<u64>,
        include_items: bool,
    ) -> Result<Vec<BillWithItems>, ServiceError> {
        let db = &*self.db_pool;
        let limit = limit
            .unwrap_or(self.default_list_limit)
            .clamp(1, MAX_LIST_LIMIT);

        let bills = bill::Entity::find()
            .filter(bill::Column::UserId.eq(user_id))
            .order_by_desc(bill::Column::CreatedAt)
            .limit(limit)
            .all(db)
            .await?;

        if !include_items {
            return Ok(bills
                .into_iter()
                .map(|bill| BillWithItems { bill, items: None })
                .collect());
        }

        let items = bills.load_many(bill_item::Entity, db).await?;
        Ok(bills
            .into_iter()
            .zip(items)
            .map(|(bill, items)| BillWithItems {
                bill,
                items: Some(items),
            })
            .collect())
    }

    /// A bill and its items. Bills owned by someone else are reported as missing.
    #[instrument(skip(self))]
    pub async fn get_bill(
        &self,
        user_id: &str,
        bill_id: Uuid,
    ) -> Result<BillWithItems, ServiceError> {
        let bill = self.find_owned(user_id, bill_id).await?;
        let items = bill
            .find_related(bill_item::Entity)
            .order_by_asc(bill_item::Column::CreatedAt)
            .all(&*self.db_pool)
            .await?;

        Ok(BillWithItems {
            bill,
            items: Some(items),
        })
    }

    /// Totals over `[now - period_days, now]`
    #[instrument(skip(self))]
    pub async fn get_stats(
        &self,
        user_id: &str,
        period_days: Option<u32>,
    ) -> Result<BillStats, ServiceError> {
        let period_days = period_days.unwrap_or(self.default_period_days);
        if !(1..=MAX_STATS_PERIOD_DAYS).contains(&period_days) {
            return Err(ServiceError::ValidationError(format!(
                "period must be between 1 and {MAX_STATS_PERIOD_DAYS} days"
            )));
        }

        let window_end = Utc::now();
        let window_start = window_end - Duration::days(i64::from(period_days));

        let rows: Vec<(String, rust_decimal::Decimal, rust_decimal::Decimal)> =
            bill::Entity::find()
                .select_only()
                .column(bill::Column::TransactionType)
                .column(bill::Column::TotalAmount)
                .column(bill::Column::GstAmount)
                .filter(bill::Column::UserId.eq(user_id))
                .filter(bill::Column::CreatedAt.gte(window_start))
                .filter(bill::Column::CreatedAt.lte(window_end))
                .into_tuple()
                .all(&*self.db_pool)
                .await?;

        let rows = rows.into_iter().filter_map(|(kind, amount, gst)| {
            match TransactionType::from_str(&kind) {
                Ok(kind) => Some((kind, amount, gst)),
                Err(_) => {
                    warn!(transaction_type = %kind, "skipping bill with unknown transaction type");
                    None
                }
            }
        });

        BillStats::empty(period_days, window_start, window_end)
            .accumulate(rows)
            .ok_or_else(|| {
                ServiceError::InternalError("bill totals exceed the decimal range".into())
            })
    }

    /// Fetches the stored file for a bill the caller owns
    #[instrument(skip(self))]
    pub async fn download_bill(
        &self,
        user_id: &str,
        bill_id: Uuid,
    ) -> Result<BillDownload, ServiceError> {
        let bill = self.find_owned(user_id, bill_id).await?;
        let object = self.storage.retrieve(&bill.file_key, &bill.file_url).await?;

        let filename = filename_from_key(&bill.file_key).to_string();
        let content_type = object
            .content_type
            .filter(|ct| !ct.trim().is_empty())
            .unwrap_or_else(|| content_type_for_filename(&filename).to_string());

        Ok(BillDownload {
            bytes: object.bytes,
            content_type,
            filename,
        })
    }

    /// Removes the bill and its items together. The stored file is kept.
    #[instrument(skip(self))]
    pub async fn delete_bill(&self, user_id: &str, bill_id: Uuid) -> Result<(), ServiceError> {
        let txn = self.db_pool.begin().await?;

        let bill = bill::Entity::find_by_id(bill_id)
            .filter(bill::Column::UserId.eq(user_id))
            .one(&txn)
            .await?
            .ok_or_else(|| not_found(bill_id))?;

        let removed_items = bill_item::Entity::delete_many()
            .filter(bill_item::Column::BillId.eq(bill.id))
            .exec(&txn)
            .await?
            .rows_affected;
        bill::Entity::delete_by_id(bill.id).exec(&txn).await?;
        txn.commit().await?;

        info!(bill_id = %bill_id, removed_items, "bill deleted");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        user_id: &str,
        bill_id: Uuid,
        status: BillStatus,
    ) -> Result<bill::Model, ServiceError> {
        let bill = self.find_owned(user_id, bill_id).await?;
        let previous = bill.status;

        let mut active: bill::ActiveModel = bill.into();
        active.status = Set(status);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db_pool).await?;

        info!(bill_id = %bill_id, from = %previous, to = %status, "bill status updated");
        Ok(updated)
    }

    async fn find_owned(&self, user_id: &str, bill_id: Uuid) -> Result<bill::Model, ServiceError> {
        bill::Entity::find_by_id(bill_id)
            .filter(bill::Column::UserId.eq(user_id))
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| not_found(bill_id))
    }
}

fn not_found(bill_id: Uuid) -> ServiceError {
    ServiceError::NotFound(format!("Bill {bill_id} not found"))
}
