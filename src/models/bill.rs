use crate::entities::{bill, bill_item, BillStatus, TransactionType};
use crate::models::extraction::ExtractedBill;
use bytes::Bytes;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// A bill header together with its line items as loaded from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct BillWithItems {
    pub bill: bill::Model,
    pub items: Option<Vec<bill_item::Model>>,
}

/// Outcome of a successful ingestion
#[derive(Debug, Clone, PartialEq)]
pub struct IngestedBill {
    pub bill_id: Uuid,
    pub data: ExtractedBill,
}

/// Stored file ready to stream back to its owner
#[derive(Debug, Clone)]
pub struct BillDownload {
    pub bytes: Bytes,
    pub content_type: String,
    pub filename: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BillItemView {
    pub id: Uuid,
    pub bill_id: Uuid,
    pub description: String,
    #[schema(value_type = String)]
    pub quantity: Decimal,
    #[schema(value_type = String)]
    pub unit_price: Decimal,
    #[schema(value_type = String)]
    pub amount: Decimal,
    #[schema(value_type = String)]
    pub gst_rate: Decimal,
    pub category: String,
    pub created_at: DateTime<Utc>,
}

impl From<bill_item::Model> for BillItemView {
    fn from(model: bill_item::Model) -> Self {
        Self {
            id: model.id,
            bill_id: model.bill_id,
            description: model.description,
            quantity: model.quantity,
            unit_price: model.unit_price,
            amount: model.amount,
            gst_rate: model.gst_rate,
            category: model.category,
            created_at: model.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BillView {
    pub id: Uuid,
    pub user_id: String,
    pub file_url: String,
    pub file_name: String,
    pub content_type: String,
    pub invoice_number: String,
    pub invoice_date: NaiveDate,
    pub seller_name: String,
    pub seller_address: String,
    pub seller_gstin: String,
    pub buyer_name: String,
    pub buyer_address: String,
    pub buyer_gstin: String,
    #[schema(value_type = String, example = "1180.00")]
    pub total_amount: Decimal,
    #[schema(value_type = String, example = "180.00")]
    pub gst_amount: Decimal,
    pub transaction_type: TransactionType,
    pub category: String,
    pub status: BillStatus,
    #[schema(value_type = Object)]
    pub raw_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<BillItemView>>,
}

impl From<BillWithItems> for BillView {
    fn from(value: BillWithItems) -> Self {
        let BillWithItems { bill, items } = value;
        Self {
            id: bill.id,
            user_id: bill.user_id,
            file_url: bill.file_url,
            file_name: bill.file_name,
            content_type: bill.content_type,
            invoice_number: bill.invoice_number,
            invoice_date: bill.invoice_date,
            seller_name: bill.seller_name,
            seller_address: bill.seller_address,
            seller_gstin: bill.seller_gstin,
            buyer_name: bill.buyer_name,
            buyer_address: bill.buyer_address,
            buyer_gstin: bill.buyer_gstin,
            total_amount: bill.total_amount,
            gst_amount: bill.gst_amount,
            transaction_type: bill.transaction_type,
            category: bill.category,
            status: bill.status,
            raw_data: bill.raw_data,
            created_at: bill.created_at,
            updated_at: bill.updated_at,
            items: items.map(|items| items.into_iter().map(BillItemView::from).collect()),
        }
    }
}

impl From<bill::Model> for BillView {
    fn from(bill: bill::Model) -> Self {
        BillWithItems { bill, items: None }.into()
    }
}

/// Aggregates over `[window_start, window_end]`, split by transaction type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BillStats {
    pub period_days: u32,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub total_bills: u64,
    #[schema(value_type = String)]
    pub total_amount: Decimal,
    #[schema(value_type = String)]
    pub total_gst: Decimal,
    #[schema(value_type = String)]
    pub sales_amount: Decimal,
    #[schema(value_type = String)]
    pub purchase_amount: Decimal,
    #[schema(value_type = String)]
    pub sales_gst: Decimal,
    #[schema(value_type = String)]
    pub purchase_gst: Decimal,
    /// GST paid on purchases in the window
    #[schema(value_type = String)]
    pub reclaimable_gst: Decimal,
}

impl BillStats {
    pub fn empty(period_days: u32, window_start: DateTime<Utc>, window_end: DateTime<Utc>) -> Self {
        Self {
            period_days,
            window_start,
            window_end,
            total_bills: 0,
            total_amount: Decimal::ZERO,
            total_gst: Decimal::ZERO,
            sales_amount: Decimal::ZERO,
            purchase_amount: Decimal::ZERO,
            sales_gst: Decimal::ZERO,
            purchase_gst: Decimal::ZERO,
            reclaimable_gst: Decimal::ZERO,
        }
    }

    /// Folds `(transaction_type, total_amount, gst_amount)` rows into the aggregate.
    /// Returns `None` when a running sum leaves the decimal range.
    pub fn accumulate<I>(mut self, rows: I) -> Option<Self>
    where
        I: IntoIterator<Item = (TransactionType, Decimal, Decimal)>,
    {
        for (transaction_type, amount, gst) in rows {
            self.total_bills += 1;
            self.total_amount = self.total_amount.checked_add(amount)?;
            self.total_gst = self.total_gst.checked_add(gst)?;
            let (type_amount, type_gst) = match transaction_type {
                TransactionType::Sales => (&mut self.sales_amount, &mut self.sales_gst),
                TransactionType::Purchase => (&mut self.purchase_amount, &mut self.purchase_gst),
            };
            *type_amount = type_amount.checked_add(amount)?;
            *type_gst = type_gst.checked_add(gst)?;
        }
        self.reclaimable_gst = self.purchase_gst;
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn stats_split_by_transaction_type() {
        let now = Utc::now();
        let stats = BillStats::empty(30, now - chrono::Duration::days(30), now).accumulate([
            (TransactionType::Sales, dec!(1180.00), dec!(180.00)),
            (TransactionType::Purchase, dec!(590.00), dec!(90.00)),
            (TransactionType::Purchase, dec!(118.00), dec!(18.00)),
        ])
        .unwrap();

        assert_eq!(stats.total_bills, 3);
        assert_eq!(stats.total_amount, dec!(1888.00));
        assert_eq!(stats.total_gst, dec!(288.00));
        assert_eq!(stats.sales_amount, dec!(1180.00));
        assert_eq!(stats.sales_gst, dec!(180.00));
        assert_eq!(stats.purchase_amount, dec!(708.00));
        assert_eq!(stats.purchase_gst, dec!(108.00));
        assert_eq!(stats.reclaimable_gst, dec!(108.00));
    }

    #[test]
    fn reclaimable_gst_is_zero_without_purchases() {
        let now = Utc::now();
        let stats = BillStats::empty(7, now - chrono::Duration::days(7), now)
            .accumulate([(TransactionType::Sales, dec!(100), dec!(18))])
            .unwrap();
        assert_eq!(stats.reclaimable_gst, Decimal::ZERO);
        assert_eq!(stats.total_gst, dec!(18));
    }

    #[test]
    fn overflowing_sums_are_reported() {
        let now = Utc::now();
        let stats = BillStats::empty(30, now - chrono::Duration::days(30), now).accumulate([
            (TransactionType::Purchase, Decimal::MAX, dec!(1)),
            (TransactionType::Purchase, Decimal::MAX, dec!(1)),
        ]);
        assert!(stats.is_none());
    }
}
