use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::ToSchema;

/// Direction of money for a bill. Always supplied by the uploader, never inferred.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum TransactionType {
    /// Money outbound
    #[default]
    #[sea_orm(string_value = "purchase")]
    Purchase,
    /// Money inbound
    #[sea_orm(string_value = "sales")]
    Sales,
}

/// Review lifecycle. The only field of a bill that may change after ingestion.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum BillStatus {
    #[default]
    #[sea_orm(string_value = "processed")]
    Processed,
    #[sea_orm(string_value = "reviewed")]
    Reviewed,
    #[sea_orm(string_value = "flagged")]
    Flagged,
    #[sea_orm(string_value = "archived")]
    Archived,
}

/// The `bills` table: one normalized invoice header per upload.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "bills")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Identity-provider subject of the uploader
    pub user_id: String,
    /// Object key inside the storage bucket
    pub file_key: String,
    pub file_url: String,
    pub file_name: String,
    pub content_type: String,
    pub invoice_number: String,
    pub invoice_date: NaiveDate,
    pub seller_name: String,
    #[sea_orm(column_type = "Text")]
    pub seller_address: String,
    pub seller_gstin: String,
    pub buyer_name: String,
    #[sea_orm(column_type = "Text")]
    pub buyer_address: String,
    pub buyer_gstin: String,
    pub total_amount: Decimal,
    pub gst_amount: Decimal,
    pub transaction_type: TransactionType,
    pub category: String,
    pub status: BillStatus,
    /// Extraction response exactly as received
    pub raw_data: Json,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::bill_item::Entity")]
    BillItems,
}

impl Related<super::bill_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BillItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
