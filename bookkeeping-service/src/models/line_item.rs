//! Invoice line item model for bookkeeping-service.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Line item on an invoice.
///
/// `amount` is always `quantity * unit_price`. `target_amount` is the value in
/// `target_currency`; unless `target_amount_overridden` is set it equals
/// `amount * fx_rate_used`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InvoiceItem {
    pub item_id: Uuid,
    pub invoice_id: Uuid,
    pub user_id: Uuid,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub amount: Decimal,
    pub target_currency: String,
    pub target_amount: Decimal,
    pub fx_rate_used: Option<Decimal>,
    pub target_amount_overridden: bool,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

/// What the caller wants done with an item's target amount on write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetAmountIntent {
    /// No instruction. A stored manual value survives as long as the native
    /// amount and currencies are unchanged; otherwise the market rate is used.
    Keep,
    /// Use this value as the authoritative target amount.
    Override(Decimal),
    /// Discard any manual value and resync to the market rate.
    Recalculate,
}

impl TargetAmountIntent {
    /// Resolve the two request fields. Forced recalculation wins when both
    /// are present.
    pub fn from_request(target_amount: Option<Decimal>, auto_calculate: Option<bool>) -> Self {
        match (auto_calculate, target_amount) {
            (Some(true), _) => TargetAmountIntent::Recalculate,
            (_, Some(value)) => TargetAmountIntent::Override(value),
            _ => TargetAmountIntent::Keep,
        }
    }
}

/// Monetary fields computed by the amount engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemAmounts {
    pub amount: Decimal,
    pub target_amount: Decimal,
    pub fx_rate_used: Option<Decimal>,
    pub overridden: bool,
}

/// A line item as requested by the caller, before amounts are computed.
#[derive(Debug, Clone)]
pub struct NewInvoiceItem {
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    /// Falls back to the configured reporting currency.
    pub target_currency: Option<String>,
    pub intent: TargetAmountIntent,
}

/// Row to insert, with amounts already computed.
#[derive(Debug, Clone)]
pub struct CreateInvoiceItem {
    pub user_id: Uuid,
    pub invoice_id: Uuid,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub target_currency: String,
    pub amounts: ItemAmounts,
}

/// Input for updating a line item. `None` leaves a field as stored.
#[derive(Debug, Clone)]
pub struct UpdateInvoiceItem {
    pub description: Option<String>,
    pub quantity: Option<Decimal>,
    pub unit_price: Option<Decimal>,
    pub target_currency: Option<String>,
    pub intent: TargetAmountIntent,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn recalculation_wins_over_override() {
        let intent = TargetAmountIntent::from_request(Some(dec!(12.5)), Some(true));
        assert_eq!(intent, TargetAmountIntent::Recalculate);
    }

    #[test]
    fn override_applies_when_recalculation_not_requested() {
        assert_eq!(
            TargetAmountIntent::from_request(Some(dec!(12.5)), Some(false)),
            TargetAmountIntent::Override(dec!(12.5))
        );
        assert_eq!(
            TargetAmountIntent::from_request(Some(dec!(12.5)), None),
            TargetAmountIntent::Override(dec!(12.5))
        );
    }

    #[test]
    fn no_fields_means_keep() {
        assert_eq!(
            TargetAmountIntent::from_request(None, None),
            TargetAmountIntent::Keep
        );
        assert_eq!(
            TargetAmountIntent::from_request(None, Some(false)),
            TargetAmountIntent::Keep
        );
    }
}
