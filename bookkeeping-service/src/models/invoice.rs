//! Invoice model for bookkeeping-service.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Invoice lifecycle status. Every invoice is in exactly one of these, which
/// is what makes the reporting buckets mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Unpaid,
    Paid,
    Overdue,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Unpaid => "unpaid",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Overdue => "overdue",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unpaid" => Some(InvoiceStatus::Unpaid),
            "paid" => Some(InvoiceStatus::Paid),
            "overdue" => Some(InvoiceStatus::Overdue),
            _ => None,
        }
    }
}

/// Invoice row. Monetary totals are not stored here; they are derived from
/// the items.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Invoice {
    pub invoice_id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub status: String,
    pub currency: String,
    pub due_date: Option<NaiveDate>,
    pub category_id: Option<Uuid>,
    pub company_id: Option<Uuid>,
    pub receiver_id: Option<Uuid>,
    pub created_utc: DateTime<Utc>,
}

/// Invoice with its derived totals.
#[derive(Debug, Clone, Serialize)]
pub struct InvoiceTotals {
    /// Sum of native item amounts, in the invoice currency.
    pub amount: Decimal,
    /// Sum of normalized item amounts, in the reporting currency.
    pub target_total: Decimal,
}

/// Input for creating an invoice.
#[derive(Debug, Clone)]
pub struct CreateInvoice {
    pub user_id: Uuid,
    pub title: String,
    pub status: InvoiceStatus,
    pub currency: String,
    pub due_date: Option<NaiveDate>,
    pub category_id: Option<Uuid>,
    pub company_id: Option<Uuid>,
    pub receiver_id: Option<Uuid>,
    pub tag_ids: Vec<Uuid>,
}
