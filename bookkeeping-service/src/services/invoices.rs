//! Invoice and line item writes that need the amount engine.

use crate::models::{
    CreateInvoiceItem, Invoice, InvoiceItem, NewInvoiceItem, TargetAmountIntent,
    UpdateInvoiceItem,
};
use crate::services::fx::normalize_currency_code;
use crate::services::line_items::{AmountRequest, LineItemAmountEngine};
use crate::services::Database;
use anyhow::anyhow;
use service_core::error::AppError;
use tracing::{info, instrument};
use uuid::Uuid;

#[derive(Clone)]
pub struct InvoiceService {
    db: Database,
    engine: LineItemAmountEngine,
    reporting_currency: String,
}

impl InvoiceService {
    pub fn new(db: Database, engine: LineItemAmountEngine, reporting_currency: String) -> Self {
        Self {
            db,
            engine,
            reporting_currency,
        }
    }

    async fn require_invoice(&self, user_id: Uuid, invoice_id: Uuid) -> Result<Invoice, AppError> {
        self.db
            .get_invoice(user_id, invoice_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow!("Invoice {} not found", invoice_id)))
    }

    /// Item totals are summed by the reports, so every item is normalized
    /// into the reporting currency.
    fn target_currency(&self, requested: Option<&str>) -> Result<String, AppError> {
        let code = normalize_currency_code(requested.unwrap_or(&self.reporting_currency))?;
        if code != self.reporting_currency {
            return Err(AppError::BadRequest(anyhow!(
                "Target currency must be the reporting currency {}, got {}",
                self.reporting_currency,
                code
            )));
        }
        Ok(code)
    }

    #[instrument(skip(self, input), fields(user_id = %user_id, invoice_id = %invoice_id))]
    pub async fn add_item(
        &self,
        user_id: Uuid,
        invoice_id: Uuid,
        input: NewInvoiceItem,
    ) -> Result<InvoiceItem, AppError> {
        let invoice = self.require_invoice(user_id, invoice_id).await?;
        let target_currency = self.target_currency(input.target_currency.as_deref())?;

        let amounts = self
            .engine
            .compute(
                AmountRequest {
                    quantity: input.quantity,
                    unit_price: input.unit_price,
                    source_currency: &invoice.currency,
                    target_currency: &target_currency,
                    intent: input.intent,
                },
                None,
            )
            .await?;

        self.db
            .insert_item(&CreateInvoiceItem {
                user_id,
                invoice_id,
                description: input.description,
                quantity: input.quantity,
                unit_price: input.unit_price,
                target_currency,
                amounts,
            })
            .await
    }

    #[instrument(skip(self, changes), fields(user_id = %user_id, item_id = %item_id))]
    pub async fn update_item(
        &self,
        user_id: Uuid,
        invoice_id: Uuid,
        item_id: Uuid,
        changes: UpdateInvoiceItem,
    ) -> Result<InvoiceItem, AppError> {
        let invoice = self.require_invoice(user_id, invoice_id).await?;
        let prior = self
            .db
            .get_item(user_id, invoice_id, item_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow!("Item {} not found", item_id)))?;

        let target_currency = self.target_currency(changes.target_currency.as_deref())?;
        let quantity = changes.quantity.unwrap_or(prior.quantity);
        let unit_price = changes.unit_price.unwrap_or(prior.unit_price);

        let amounts = self
            .engine
            .compute(
                AmountRequest {
                    quantity,
                    unit_price,
                    source_currency: &invoice.currency,
                    target_currency: &target_currency,
                    intent: changes.intent,
                },
                Some(&prior),
            )
            .await?;

        let updated = InvoiceItem {
            description: changes.description.unwrap_or_else(|| prior.description.clone()),
            quantity,
            unit_price,
            amount: amounts.amount,
            target_currency,
            target_amount: amounts.target_amount,
            fx_rate_used: amounts.fx_rate_used,
            target_amount_overridden: amounts.overridden,
            ..prior
        };

        let mut saved = self.db.save_items(user_id, &[updated]).await?;
        saved
            .pop()
            .ok_or_else(|| AppError::NotFound(anyhow!("Item {} not found", item_id)))
    }

    /// Resync every item of an invoice to the current market rate, dropping
    /// manual overrides. Rates are resolved first; the rows are then written
    /// in one transaction.
    #[instrument(skip(self), fields(user_id = %user_id, invoice_id = %invoice_id))]
    pub async fn recalculate_invoice(
        &self,
        user_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Vec<InvoiceItem>, AppError> {
        let invoice = self.require_invoice(user_id, invoice_id).await?;
        let items = self.db.list_items(user_id, invoice_id).await?;

        let mut recalculated = Vec::with_capacity(items.len());
        for item in items {
            let amounts = self
                .engine
                .compute(
                    AmountRequest {
                        quantity: item.quantity,
                        unit_price: item.unit_price,
                        source_currency: &invoice.currency,
                        target_currency: &item.target_currency,
                        intent: TargetAmountIntent::Recalculate,
                    },
                    Some(&item),
                )
                .await?;

            recalculated.push(InvoiceItem {
                amount: amounts.amount,
                target_amount: amounts.target_amount,
                fx_rate_used: amounts.fx_rate_used,
                target_amount_overridden: amounts.overridden,
                ..item
            });
        }

        let saved = self.db.save_items(user_id, &recalculated).await?;

        info!(items = saved.len(), "Invoice recalculated");

        Ok(saved)
    }
}
