//! Shape of the extraction workflow's response and its normalization into
//! the values persisted for a bill.

use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;
use tracing::warn;
use utoipa::ToSchema;

pub const UNCATEGORIZED: &str = "uncategorized";

static GSTIN_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9]{2}[A-Z]{5}[0-9]{4}[A-Z]{1}[0-9A-Z]{1}[Z]{1}[0-9A-Z]{1}$")
        .expect("GSTIN pattern compiles")
});

static DAY_FIRST_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,2})[/-](\d{1,2})[/-](\d{2}|\d{4})$")
        .expect("date pattern compiles")
});

/// The workflow either nests the extracted fields under `output` or returns them bare.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ExtractionResponse {
    Wrapped { output: Map<String, Value> },
    Bare(Map<String, Value>),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ExtractionShapeError {
    #[error("extraction response is not a JSON object (got {0})")]
    NotAnObject(&'static str),
    #[error("item amount overflows: {quantity} x {unit_price}")]
    AmountOverflow { quantity: Decimal, unit_price: Decimal },
}

impl ExtractionResponse {
    /// Resolves a raw response into one of the two accepted shapes.
    pub fn resolve(raw: &Value) -> Result<Self, ExtractionShapeError> {
        match raw {
            Value::Object(map) => match map.get("output") {
                Some(Value::Object(output)) => Ok(Self::Wrapped {
                    output: output.clone(),
                }),
                _ => Ok(Self::Bare(map.clone())),
            },
            other => Err(ExtractionShapeError::NotAnObject(json_kind(other))),
        }
    }

    pub fn payload(&self) -> &Map<String, Value> {
        match self {
            Self::Wrapped { output } => output,
            Self::Bare(payload) => payload,
        }
    }

    pub fn shape(&self) -> &'static str {
        match self {
            Self::Wrapped { .. } => "wrapped",
            Self::Bare(_) => "bare",
        }
    }

    /// Applies defaults and invariants to the extracted fields.
    pub fn normalize(&self, today: NaiveDate) -> Result<ExtractedBill, ExtractionShapeError> {
        let payload = self.payload();

        let invoice_date = match text_at(payload, &["invoice", "invoiceDate"]) {
            Some(raw) => parse_date(&raw).unwrap_or_else(|| {
                warn!(invoice_date = %raw, "unparseable invoice date, using today");
                today
            }),
            None => today,
        };

        let seller = Party::from_payload(payload, "seller");
        let buyer = Party::from_payload(payload, "buyer");

        let items = match payload.get("items") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_object)
                .map(ExtractedItem::from_payload)
                .collect::<Result<Vec<_>, _>>()?,
            Some(Value::Null) | None => Vec::new(),
            Some(other) => {
                warn!(kind = json_kind(other), "items is not an array, ignoring");
                Vec::new()
            }
        };

        Ok(ExtractedBill {
            invoice_number: text_at(payload, &["invoice", "invoiceNo"]).unwrap_or_default(),
            invoice_date,
            seller,
            buyer,
            total_amount: money(payload.get("totalAmount"), "totalAmount"),
            gst_amount: money(payload.get("gstAmount"), "gstAmount"),
            category: text_at(payload, &["category"])
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| UNCATEGORIZED.to_string()),
            items,
        })
    }
}

/// Normalized bill header plus items, as stored and returned to the uploader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedBill {
    pub invoice_number: String,
    pub invoice_date: NaiveDate,
    pub seller: Party,
    pub buyer: Party,
    #[schema(value_type = String, example = "1180.00")]
    pub total_amount: Decimal,
    #[schema(value_type = String, example = "180.00")]
    pub gst_amount: Decimal,
    pub category: String,
    pub items: Vec<ExtractedItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Party {
    pub name: String,
    pub address: String,
    pub gstin: String,
}

impl Party {
    fn from_payload(payload: &Map<String, Value>, role: &'static str) -> Self {
        let party = Self {
            name: text_at(payload, &[role, "name"]).unwrap_or_default(),
            address: text_at(payload, &[role, "address"]).unwrap_or_default(),
            gstin: text_at(payload, &[role, "gstin"])
                .map(|g| g.to_ascii_uppercase())
                .unwrap_or_default(),
        };
        if !party.gstin.is_empty() && !is_valid_gstin(&party.gstin) {
            warn!(role, gstin = %party.gstin, "extracted GSTIN does not match the expected format");
        }
        party
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedItem {
    pub description: String,
    #[schema(value_type = String, example = "2")]
    pub quantity: Decimal,
    #[schema(value_type = String, example = "500.00")]
    pub unit_price: Decimal,
    /// Always `quantity * unit_price`
    #[schema(value_type = String, example = "1000.00")]
    pub amount: Decimal,
    #[schema(value_type = String, example = "18")]
    pub gst_rate: Decimal,
    pub category: String,
}

impl ExtractedItem {
    /// Builds an item from already-parsed numbers, recomputing the amount.
    pub fn new(
        description: impl Into<String>,
        quantity: Decimal,
        unit_price: Decimal,
        gst_rate: Decimal,
        category: impl Into<String>,
    ) -> Result<Self, ExtractionShapeError> {
        let quantity = quantity.max(Decimal::ZERO);
        let unit_price = unit_price.max(Decimal::ZERO);
        let amount = quantity
            .checked_mul(unit_price)
            .ok_or(ExtractionShapeError::AmountOverflow {
                quantity,
                unit_price,
            })?;
        Ok(Self {
            description: description.into(),
            quantity,
            unit_price,
            amount,
            gst_rate: gst_rate.max(Decimal::ZERO),
            category: category.into(),
        })
    }

    fn from_payload(item: &Map<String, Value>) -> Result<Self, ExtractionShapeError> {
        let supplied_amount = item.get("amount").and_then(lenient_decimal);
        let built = Self::new(
            text_at(item, &["description"]).unwrap_or_default(),
            money(item.get("quantity"), "quantity"),
            money(item.get("unitPrice"), "unitPrice"),
            money(item.get("gstRate"), "gstRate"),
            text_at(item, &["category"])
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| UNCATEGORIZED.to_string()),
        )?;
        if let Some(supplied) = supplied_amount {
            if supplied != built.amount {
                warn!(
                    supplied = %supplied,
                    recomputed = %built.amount,
                    "extracted item amount disagrees with quantity x unit price"
                );
            }
        }
        Ok(built)
    }
}

pub fn is_valid_gstin(gstin: &str) -> bool {
    GSTIN_PATTERN.is_match(gstin)
}

/// Parses the date formats seen on Indian invoices. Day-first numeric dates
/// with two-digit years land in 20xx.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Some(caps) = DAY_FIRST_DATE.captures(trimmed) {
        let day: u32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let mut year: i32 = caps[3].parse().ok()?;
        if caps[3].len() == 2 {
            year += 2000;
        }
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(ts.with_timezone(&Utc).date_naive());
    }
    ["%d %b %Y", "%d %B %Y", "%b %d, %Y", "%B %d, %Y", "%Y/%m/%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
}

/// Numbers arrive as JSON numbers or as strings such as "1,180.00" or "₹ 500".
fn lenient_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .ok(),
        Value::String(s) => {
            let cleaned: String = s
                .trim()
                .trim_start_matches('₹')
                .trim_end_matches('%')
                .chars()
                .filter(|c| !c.is_whitespace() && *c != ',')
                .collect();
            Decimal::from_str(&cleaned).ok()
        }
        _ => None,
    }
}

/// Missing or unparseable numbers become zero; negatives are clamped to zero.
fn money(value: Option<&Value>, field: &'static str) -> Decimal {
    let parsed = value.and_then(lenient_decimal).unwrap_or(Decimal::ZERO);
    if parsed.is_sign_negative() && !parsed.is_zero() {
        warn!(field, value = %parsed, "negative amount clamped to zero");
        return Decimal::ZERO;
    }
    parsed
}

fn text_at(payload: &Map<String, Value>, path: &[&str]) -> Option<String> {
    let (last, parents) = path.split_last()?;
    let mut current = payload;
    for key in parents {
        current = current.get(*key)?.as_object()?;
    }
    match current.get(*last)? {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
