//! Line item amount engine.
//!
//! Every item write goes through here so that `amount` is always
//! `quantity * unit_price` and the target amount is either a market
//! conversion or an explicit manual value.

use crate::models::{InvoiceItem, ItemAmounts, TargetAmountIntent};
use crate::services::fx::{normalize_currency_code, CurrencyNormalizer};
use anyhow::anyhow;
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Inputs for one amount computation.
#[derive(Debug, Clone, Copy)]
pub struct AmountRequest<'a> {
    pub quantity: Decimal,
    pub unit_price: Decimal,
    /// The owning invoice's currency.
    pub source_currency: &'a str,
    pub target_currency: &'a str,
    pub intent: TargetAmountIntent,
}

#[derive(Clone)]
pub struct LineItemAmountEngine {
    normalizer: Arc<CurrencyNormalizer>,
}

impl LineItemAmountEngine {
    pub fn new(normalizer: Arc<CurrencyNormalizer>) -> Self {
        Self { normalizer }
    }

    /// Compute the monetary fields for a create (`prior = None`) or an
    /// update of `prior`.
    #[instrument(skip(self, prior))]
    pub async fn compute(
        &self,
        request: AmountRequest<'_>,
        prior: Option<&InvoiceItem>,
    ) -> Result<ItemAmounts, AppError> {
        let amount = native_amount(request.quantity, request.unit_price)?;
        let source = normalize_currency_code(request.source_currency)?;
        let target = normalize_currency_code(request.target_currency)?;
        let prior_rate = prior.and_then(|item| item.fx_rate_used);

        match request.intent {
            TargetAmountIntent::Override(value) => {
                if value < Decimal::ZERO {
                    return Err(AppError::BadRequest(anyhow!(
                        "target_amount cannot be negative"
                    )));
                }

                let rate = if amount.is_zero() {
                    prior_rate
                } else {
                    Some(value.checked_div(amount).ok_or_else(|| {
                        AppError::BadRequest(anyhow!("target_amount is out of range"))
                    })?)
                };

                Ok(ItemAmounts {
                    amount,
                    target_amount: value,
                    fx_rate_used: rate,
                    overridden: true,
                })
            }
            TargetAmountIntent::Keep => {
                let preserved = prior.filter(|item| {
                    item.target_amount_overridden
                        && item.amount == amount
                        && item.target_currency == target
                });

                match preserved {
                    Some(item) => {
                        debug!(item_id = %item.item_id, "Keeping manual target amount");
                        Ok(ItemAmounts {
                            amount,
                            target_amount: item.target_amount,
                            fx_rate_used: item.fx_rate_used,
                            overridden: true,
                        })
                    }
                    None => self.at_market_rate(amount, &source, &target, prior_rate).await,
                }
            }
            TargetAmountIntent::Recalculate => {
                self.at_market_rate(amount, &source, &target, prior_rate)
                    .await
            }
        }
    }

    async fn at_market_rate(
        &self,
        amount: Decimal,
        source: &str,
        target: &str,
        prior_rate: Option<Decimal>,
    ) -> Result<ItemAmounts, AppError> {
        // A zero amount converts to zero at any rate; no lookup needed.
        if amount.is_zero() {
            let rate = if source == target {
                Some(Decimal::ONE)
            } else {
                prior_rate
            };
            return Ok(ItemAmounts {
                amount,
                target_amount: Decimal::ZERO,
                fx_rate_used: rate,
                overridden: false,
            });
        }

        let normalized = self.normalizer.normalize(amount, source, target).await?;

        Ok(ItemAmounts {
            amount,
            target_amount: normalized.amount,
            fx_rate_used: Some(normalized.rate),
            overridden: false,
        })
    }
}

/// `quantity * unit_price`, rejecting negatives and overflow.
pub fn native_amount(quantity: Decimal, unit_price: Decimal) -> Result<Decimal, AppError> {
    if quantity < Decimal::ZERO {
        return Err(AppError::BadRequest(anyhow!("quantity cannot be negative")));
    }
    if unit_price < Decimal::ZERO {
        return Err(AppError::BadRequest(anyhow!(
            "unit_price cannot be negative"
        )));
    }

    quantity
        .checked_mul(unit_price)
        .ok_or_else(|| AppError::BadRequest(anyhow!("quantity * unit_price overflows")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::fx::testing::FakeProvider;
    use crate::services::fx::RateCache;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::time::Duration;
    use uuid::Uuid;

    fn engine(provider: FakeProvider) -> (LineItemAmountEngine, Arc<FakeProvider>) {
        let provider = Arc::new(provider);
        let normalizer = CurrencyNormalizer::new(
            Arc::new(RateCache::default()),
            provider.clone(),
            Duration::from_secs(1),
        );
        (LineItemAmountEngine::new(Arc::new(normalizer)), provider)
    }

    fn eur_to_usd() -> FakeProvider {
        FakeProvider::default().with_rate("EUR", "USD", dec!(1.10))
    }

    fn request(
        quantity: Decimal,
        unit_price: Decimal,
        intent: TargetAmountIntent,
    ) -> AmountRequest<'static> {
        AmountRequest {
            quantity,
            unit_price,
            source_currency: "EUR",
            target_currency: "USD",
            intent,
        }
    }

    fn stored(amounts: ItemAmounts, quantity: Decimal, unit_price: Decimal) -> InvoiceItem {
        InvoiceItem {
            item_id: Uuid::new_v4(),
            invoice_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            description: "Consulting".to_string(),
            quantity,
            unit_price,
            amount: amounts.amount,
            target_currency: "USD".to_string(),
            target_amount: amounts.target_amount,
            fx_rate_used: amounts.fx_rate_used,
            target_amount_overridden: amounts.overridden,
            created_utc: Utc::now(),
            updated_utc: Utc::now(),
        }
    }

    #[tokio::test]
    async fn converts_at_market_rate() {
        let (engine, _) = engine(eur_to_usd());

        let amounts = engine
            .compute(request(dec!(3), dec!(10), TargetAmountIntent::Keep), None)
            .await
            .unwrap();

        assert_eq!(amounts.amount, dec!(30));
        assert_eq!(amounts.target_amount, dec!(33.0));
        assert_eq!(amounts.fx_rate_used, Some(dec!(1.10)));
        assert!(!amounts.overridden);
        assert_eq!(
            amounts.target_amount,
            amounts.amount * amounts.fx_rate_used.unwrap()
        );
    }

    #[tokio::test]
    async fn override_sets_reconciling_rate() {
        let (engine, provider) = engine(eur_to_usd());

        let amounts = engine
            .compute(
                request(dec!(3), dec!(10), TargetAmountIntent::Override(dec!(36))),
                None,
            )
            .await
            .unwrap();

        assert_eq!(amounts.target_amount, dec!(36));
        assert_eq!(amounts.fx_rate_used, Some(dec!(1.2)));
        assert!(amounts.overridden);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn override_on_zero_amount_keeps_prior_rate() {
        let (engine, _) = engine(eur_to_usd());
        let prior = stored(
            ItemAmounts {
                amount: dec!(30),
                target_amount: dec!(33.0),
                fx_rate_used: Some(dec!(1.10)),
                overridden: false,
            },
            dec!(3),
            dec!(10),
        );

        let amounts = engine
            .compute(
                request(dec!(0), dec!(10), TargetAmountIntent::Override(dec!(5))),
                Some(&prior),
            )
            .await
            .unwrap();

        assert_eq!(amounts.amount, Decimal::ZERO);
        assert_eq!(amounts.target_amount, dec!(5));
        assert_eq!(amounts.fx_rate_used, Some(dec!(1.10)));
    }

    #[tokio::test]
    async fn recalculation_discards_manual_value() {
        let (engine, provider) = engine(eur_to_usd());
        let prior = stored(
            ItemAmounts {
                amount: dec!(30),
                target_amount: dec!(40),
                fx_rate_used: Some(dec!(40) / dec!(30)),
                overridden: true,
            },
            dec!(3),
            dec!(10),
        );

        let amounts = engine
            .compute(
                request(
                    dec!(3),
                    dec!(10),
                    TargetAmountIntent::from_request(Some(dec!(50)), Some(true)),
                ),
                Some(&prior),
            )
            .await
            .unwrap();

        assert_eq!(amounts.target_amount, dec!(33.0));
        assert_eq!(amounts.fx_rate_used, Some(dec!(1.10)));
        assert!(!amounts.overridden);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn neutral_update_keeps_manual_value_when_amount_unchanged() {
        let (engine, provider) = engine(eur_to_usd());
        let prior = stored(
            ItemAmounts {
                amount: dec!(30),
                target_amount: dec!(40),
                fx_rate_used: Some(dec!(40) / dec!(30)),
                overridden: true,
            },
            dec!(3),
            dec!(10),
        );

        // Same amount reached through a different quantity/price split.
        let amounts = engine
            .compute(
                request(dec!(6), dec!(5), TargetAmountIntent::Keep),
                Some(&prior),
            )
            .await
            .unwrap();

        assert_eq!(amounts.target_amount, dec!(40));
        assert_eq!(amounts.fx_rate_used, prior.fx_rate_used);
        assert!(amounts.overridden);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn neutral_update_recalculates_when_amount_changes() {
        let (engine, _) = engine(eur_to_usd());
        let prior = stored(
            ItemAmounts {
                amount: dec!(30),
                target_amount: dec!(40),
                fx_rate_used: Some(dec!(40) / dec!(30)),
                overridden: true,
            },
            dec!(3),
            dec!(10),
        );

        let amounts = engine
            .compute(
                request(dec!(4), dec!(10), TargetAmountIntent::Keep),
                Some(&prior),
            )
            .await
            .unwrap();

        assert_eq!(amounts.amount, dec!(40));
        assert_eq!(amounts.target_amount, dec!(44.0));
        assert!(!amounts.overridden);
    }

    #[tokio::test]
    async fn zero_quantity_skips_rate_lookup() {
        let (engine, provider) = engine(eur_to_usd());

        let amounts = engine
            .compute(request(dec!(0), dec!(99.99), TargetAmountIntent::Keep), None)
            .await
            .unwrap();

        assert_eq!(amounts.amount, Decimal::ZERO);
        assert_eq!(amounts.target_amount, Decimal::ZERO);
        assert_eq!(amounts.fx_rate_used, None);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn zero_amount_in_same_currency_records_unit_rate() {
        let (engine, _) = engine(FakeProvider::default());

        let amounts = engine
            .compute(
                AmountRequest {
                    quantity: dec!(2),
                    unit_price: dec!(0),
                    source_currency: "USD",
                    target_currency: "usd",
                    intent: TargetAmountIntent::Recalculate,
                },
                None,
            )
            .await
            .unwrap();

        assert_eq!(amounts.fx_rate_used, Some(Decimal::ONE));
        assert_eq!(amounts.target_amount, Decimal::ZERO);
    }

    #[tokio::test]
    async fn negative_inputs_are_rejected() {
        let (engine, _) = engine(eur_to_usd());

        for req in [
            request(dec!(-1), dec!(10), TargetAmountIntent::Keep),
            request(dec!(1), dec!(-10), TargetAmountIntent::Keep),
            request(dec!(1), dec!(10), TargetAmountIntent::Override(dec!(-5))),
        ] {
            let err = engine.compute(req, None).await.unwrap_err();
            assert!(matches!(err, AppError::BadRequest(_)));
        }
    }

    #[tokio::test]
    async fn provider_outage_surfaces_as_upstream_unavailable() {
        let (engine, provider) = engine(eur_to_usd());
        provider.set_failing(true);

        let err = engine
            .compute(request(dec!(1), dec!(10), TargetAmountIntent::Keep), None)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::UpstreamUnavailable(_)));
    }

    #[test]
    fn native_amount_is_exact() {
        assert_eq!(native_amount(dec!(0.1), dec!(0.2)).unwrap(), dec!(0.02));
        assert_eq!(native_amount(dec!(3), dec!(19.99)).unwrap(), dec!(59.97));
    }
}
