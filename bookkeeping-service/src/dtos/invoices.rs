use crate::models::{
    Invoice, InvoiceItem, InvoiceStatus, InvoiceTotals, NewInvoiceItem, TargetAmountIntent,
    UpdateInvoiceItem,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateInvoiceRequest {
    #[validate(length(min = 1, max = 255, message = "Title must be 1-255 characters"))]
    pub title: String,

    pub status: Option<InvoiceStatus>,

    /// Currency the items are priced in. Defaults to the reporting currency.
    pub currency: Option<String>,

    pub due_date: Option<NaiveDate>,
    pub category_id: Option<Uuid>,
    pub company_id: Option<Uuid>,
    pub receiver_id: Option<Uuid>,

    #[serde(default)]
    pub tag_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: InvoiceStatus,
}

#[derive(Debug, Serialize)]
pub struct InvoiceResponse {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub tag_ids: Vec<Uuid>,
    /// Sum of native item amounts, in the invoice currency.
    pub amount: Decimal,
    /// Sum of normalized item amounts.
    pub target_total: Decimal,
    pub items: Vec<InvoiceItem>,
}

impl InvoiceResponse {
    pub fn new(
        invoice: Invoice,
        tag_ids: Vec<Uuid>,
        totals: InvoiceTotals,
        items: Vec<InvoiceItem>,
    ) -> Self {
        Self {
            invoice,
            tag_ids,
            amount: totals.amount,
            target_total: totals.target_total,
            items,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateItemRequest {
    #[validate(length(min = 1, message = "Description is required"))]
    pub description: String,

    /// Defaults to 1.
    pub quantity: Option<Decimal>,
    pub unit_price: Decimal,
    pub target_currency: Option<String>,
    pub target_amount: Option<Decimal>,
    pub auto_calculate_target_currency: Option<bool>,
}

impl CreateItemRequest {
    pub fn into_new_item(self) -> NewInvoiceItem {
        NewInvoiceItem {
            intent: TargetAmountIntent::from_request(
                self.target_amount,
                self.auto_calculate_target_currency,
            ),
            description: self.description,
            quantity: self.quantity.unwrap_or(Decimal::ONE),
            unit_price: self.unit_price,
            target_currency: self.target_currency,
        }
    }
}

/// Body of `PUT /api/invoices/{id}/items/{item_id}`. Omitted fields keep
/// their stored value.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateItemRequest {
    #[validate(length(min = 1, message = "Description cannot be empty"))]
    pub description: Option<String>,
    pub quantity: Option<Decimal>,
    pub unit_price: Option<Decimal>,
    pub target_currency: Option<String>,
    pub target_amount: Option<Decimal>,
    pub auto_calculate_target_currency: Option<bool>,
}

impl UpdateItemRequest {
    pub fn into_changes(self) -> UpdateInvoiceItem {
        UpdateInvoiceItem {
            intent: TargetAmountIntent::from_request(
                self.target_amount,
                self.auto_calculate_target_currency,
            ),
            description: self.description,
            quantity: self.quantity,
            unit_price: self.unit_price,
            target_currency: self.target_currency,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RecalculateResponse {
    pub invoice_id: Uuid,
    pub target_total: Decimal,
    pub items: Vec<InvoiceItem>,
}
