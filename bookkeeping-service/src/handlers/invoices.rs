use super::{record_error, required_name};
use crate::dtos::{
    CreateInvoiceRequest, CreateItemRequest, InvoiceResponse, RecalculateResponse,
    UpdateItemRequest, UpdateStatusRequest,
};
use crate::middleware::UserId;
use crate::models::{CreateInvoice, InvoiceItem, InvoiceStatus, InvoiceTotals};
use crate::services::fx::normalize_currency_code;
use crate::startup::AppState;
use anyhow::anyhow;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

fn invoice_not_found(invoice_id: Uuid) -> AppError {
    record_error(AppError::NotFound(anyhow!(
        "Invoice {} not found",
        invoice_id
    )))
}

async fn load_invoice(
    state: &AppState,
    user_id: Uuid,
    invoice_id: Uuid,
) -> Result<InvoiceResponse, AppError> {
    let invoice = state
        .db
        .get_invoice(user_id, invoice_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow!("Invoice {} not found", invoice_id)))?;

    let tag_ids = state.db.get_invoice_tag_ids(invoice_id).await?;
    let totals = state.db.get_invoice_totals(user_id, invoice_id).await?;
    let items = state.db.list_items(user_id, invoice_id).await?;

    Ok(InvoiceResponse::new(invoice, tag_ids, totals, items))
}

pub async fn create_invoice(
    State(state): State<AppState>,
    user_id: UserId,
    Json(req): Json<CreateInvoiceRequest>,
) -> Result<(StatusCode, Json<InvoiceResponse>), AppError> {
    req.validate().map_err(|e| record_error(e.into()))?;

    let currency = normalize_currency_code(
        req.currency
            .as_deref()
            .unwrap_or(&state.config.fx.reporting_currency),
    )
    .map_err(record_error)?;

    let mut tag_ids = req.tag_ids;
    tag_ids.sort();
    tag_ids.dedup();

    let input = CreateInvoice {
        user_id: user_id.0,
        title: required_name(&req.title, "title")?,
        status: req.status.unwrap_or(InvoiceStatus::Unpaid),
        currency,
        due_date: req.due_date,
        category_id: req.category_id,
        company_id: req.company_id,
        receiver_id: req.receiver_id,
        tag_ids,
    };

    let invoice = state.db.create_invoice(&input).await.map_err(record_error)?;
    let totals = InvoiceTotals {
        amount: Decimal::ZERO,
        target_total: Decimal::ZERO,
    };

    Ok((
        StatusCode::CREATED,
        Json(InvoiceResponse::new(invoice, input.tag_ids, totals, Vec::new())),
    ))
}

pub async fn get_invoice(
    State(state): State<AppState>,
    user_id: UserId,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<InvoiceResponse>, AppError> {
    let response = load_invoice(&state, user_id.0, invoice_id)
        .await
        .map_err(record_error)?;
    Ok(Json(response))
}

pub async fn update_status(
    State(state): State<AppState>,
    user_id: UserId,
    Path(invoice_id): Path<Uuid>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<InvoiceResponse>, AppError> {
    state
        .db
        .update_invoice_status(user_id.0, invoice_id, req.status)
        .await
        .map_err(record_error)?
        .ok_or_else(|| invoice_not_found(invoice_id))?;

    let response = load_invoice(&state, user_id.0, invoice_id)
        .await
        .map_err(record_error)?;
    Ok(Json(response))
}

pub async fn delete_invoice(
    State(state): State<AppState>,
    user_id: UserId,
    Path(invoice_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let deleted = state
        .db
        .delete_invoice(user_id.0, invoice_id)
        .await
        .map_err(record_error)?;

    if !deleted {
        return Err(invoice_not_found(invoice_id));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_item(
    State(state): State<AppState>,
    user_id: UserId,
    Path(invoice_id): Path<Uuid>,
    Json(req): Json<CreateItemRequest>,
) -> Result<(StatusCode, Json<InvoiceItem>), AppError> {
    req.validate().map_err(|e| record_error(e.into()))?;

    let item = state
        .invoices
        .add_item(user_id.0, invoice_id, req.into_new_item())
        .await
        .map_err(record_error)?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn update_item(
    State(state): State<AppState>,
    user_id: UserId,
    Path((invoice_id, item_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<UpdateItemRequest>,
) -> Result<Json<InvoiceItem>, AppError> {
    req.validate().map_err(|e| record_error(e.into()))?;

    let item = state
        .invoices
        .update_item(user_id.0, invoice_id, item_id, req.into_changes())
        .await
        .map_err(record_error)?;
    Ok(Json(item))
}

/// `POST /api/invoices/{id}/recalculate`: resync every item to the market
/// rate and clear manual overrides.
pub async fn recalculate(
    State(state): State<AppState>,
    user_id: UserId,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<RecalculateResponse>, AppError> {
    let items = state
        .invoices
        .recalculate_invoice(user_id.0, invoice_id)
        .await
        .map_err(record_error)?;

    let target_total = items.iter().map(|i| i.target_amount).sum();

    Ok(Json(RecalculateResponse {
        invoice_id,
        target_total,
        items,
    }))
}
