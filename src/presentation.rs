//! Text rendering for the terminal dashboard.
//!
//! Every view goes through [`ViewState`]: it starts out loading, then settles
//! on either an error message or the data to render.

use crate::{
    client::{ClientError, DownloadedFile},
    handlers::bills::{DeletedBill, UploadBillResponse},
    models::{BillStats, BillView},
};
use rust_decimal::{Decimal, RoundingStrategy};
use std::fmt::Write;
use std::path::Path;

/// Bills shown on the dashboard
pub const DASHBOARD_RECENT_BILLS: u64 = 5;
/// Stats window used by the dashboard, wide enough to show everything recent
pub const DASHBOARD_PERIOD_DAYS: u32 = 365;

#[derive(Debug, Clone, PartialEq)]
pub enum ViewState<T> {
    Loading,
    Error(String),
    Ready(T),
}

impl<T> ViewState<T> {
    pub fn from_result(result: Result<T, ClientError>) -> Self {
        match result {
            Ok(data) => Self::Ready(data),
            Err(err) => Self::Error(err.to_string()),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    pub fn render_with(&self, render: impl FnOnce(&T) -> String) -> String {
        match self {
            Self::Loading => "Loading...".to_string(),
            Self::Error(message) => format!("Error: {message}"),
            Self::Ready(data) => render(data),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Dashboard {
    pub stats: BillStats,
    pub recent: Vec<BillView>,
}

pub fn render_dashboard(dashboard: &Dashboard) -> String {
    let stats = &dashboard.stats;
    let mut out = String::new();
    let _ = writeln!(out, "ProfitPilot dashboard (last {} days)", stats.period_days);
    let _ = writeln!(out, "{}", "=".repeat(40));
    let _ = writeln!(out, "{:<20}{:>20}", "Total bills", stats.total_bills);
    let _ = writeln!(out, "{:<20}{:>20}", "Total amount", rupees(stats.total_amount));
    let _ = writeln!(out, "{:<20}{:>20}", "Purchases", rupees(stats.purchase_amount));
    let _ = writeln!(out, "{:<20}{:>20}", "Sales", rupees(stats.sales_amount));
    let _ = writeln!(out, "{:<20}{:>20}", "GST collected", rupees(stats.sales_gst));
    let _ = writeln!(out, "{:<20}{:>20}", "Total GST", rupees(stats.total_gst));
    let _ = writeln!(out, "{:<20}{:>20}", "Reclaimable GST", rupees(stats.reclaimable_gst));
    let _ = writeln!(out);
    let _ = writeln!(out, "Recent bills");
    out.push_str(&render_bill_list(&dashboard.recent));
    out
}

pub fn render_bill_list(bills: &[BillView]) -> String {
    if bills.is_empty() {
        return "No bills uploaded yet.\n".to_string();
    }

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<16} {:<10} {:<9} {:<24} {:>14}",
        "Invoice", "Date", "Type", "Party", "Amount"
    );
    for bill in bills {
        let _ = writeln!(
            out,
            "{:<16} {:<10} {:<9} {:<24} {:>14}",
            invoice_label(bill),
            bill.invoice_date.format("%d/%m/%Y"),
            bill.transaction_type,
            truncate(&counterparty(bill), 24),
            rupees(bill.total_amount)
        );
    }
    out
}

pub fn render_bill_detail(bill: &BillView) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Bill {}", invoice_label(bill));
    let _ = writeln!(out, "  id:       {}", bill.id);
    let _ = writeln!(out, "  date:     {}", bill.invoice_date.format("%d/%m/%Y"));
    let _ = writeln!(out, "  type:     {}", bill.transaction_type);
    let _ = writeln!(out, "  status:   {}", bill.status);
    let _ = writeln!(out, "  category: {}", bill.category);
    let _ = writeln!(out, "  file:     {} ({})", bill.file_name, bill.content_type);
    let _ = writeln!(
        out,
        "  seller:   {}{}",
        or_dash(&bill.seller_name),
        gstin_suffix(&bill.seller_gstin)
    );
    let _ = writeln!(
        out,
        "  buyer:    {}{}",
        or_dash(&bill.buyer_name),
        gstin_suffix(&bill.buyer_gstin)
    );
    let _ = writeln!(out, "  total:    {}", rupees(bill.total_amount));
    let _ = writeln!(out, "  GST:      {}", rupees(bill.gst_amount));

    match bill.items.as_deref() {
        Some([]) | None => {
            let _ = writeln!(out, "  (no line items)");
        }
        Some(items) => {
            let _ = writeln!(out, "  Items:");
            for item in items {
                let _ = writeln!(
                    out,
                    "    - {} x {} @ {} = {} (GST {}%)",
                    or_dash(&item.description),
                    item.quantity.normalize(),
                    rupees(item.unit_price),
                    rupees(item.amount),
                    item.gst_rate.normalize()
                );
            }
        }
    }
    out
}

pub fn render_upload(response: &UploadBillResponse) -> String {
    let data = &response.data;
    format!(
        "{}\n  bill id: {}\n  invoice: {}\n  total:   {} (GST {})\n  items:   {}\n",
        response.message,
        response.bill_id,
        or_dash(&data.invoice_number),
        rupees(data.total_amount),
        rupees(data.gst_amount),
        data.items.len()
    )
}

pub fn render_download(saved_to: &Path, file: &DownloadedFile) -> String {
    format!(
        "Saved {} ({}, {} bytes) to {}\n",
        file.filename,
        file.content_type,
        file.bytes.len(),
        saved_to.display()
    )
}

pub fn render_deleted(deleted: &DeletedBill) -> String {
    format!("Bill {} deleted\n", deleted.bill_id)
}

/// Invoice number, or `INV-` plus the tail of the id when extraction found none
pub fn invoice_label(bill: &BillView) -> String {
    if bill.invoice_number.is_empty() {
        let id = bill.id.simple().to_string();
        format!("INV-{}", &id[id.len() - 8..])
    } else {
        bill.invoice_number.clone()
    }
}

/// Amount in rupees with thousands separators and two decimals
pub fn rupees(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let text = format!("{:.2}", rounded.abs());
    let (whole, fraction) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    let mut grouped = String::new();
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };
    format!("{sign}₹{grouped}.{fraction}")
}

fn counterparty(bill: &BillView) -> String {
    let name = match bill.transaction_type {
        crate::entities::TransactionType::Purchase => &bill.seller_name,
        crate::entities::TransactionType::Sales => &bill.buyer_name,
    };
    or_dash(name).to_string()
}

fn gstin_suffix(gstin: &str) -> String {
    if gstin.len() < 4 {
        String::new()
    } else {
        format!(" (GSTIN ...{})", &gstin[gstin.len() - 4..])
    }
}

fn or_dash(value: &str) -> &str {
    if value.trim().is_empty() {
        "-"
    } else {
        value
    }
}

fn truncate(value: &str, width: usize) -> String {
    if value.chars().count() <= width {
        value.to_string()
    } else {
        let cut: String = value.chars().take(width.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}
