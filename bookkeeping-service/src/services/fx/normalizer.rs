//! Converts amounts between currencies using cached market rates.

use super::cache::{CacheLookup, CurrencyPair, RateCache};
use super::provider::{RateProvider, RateProviderError, RateQuote};
use crate::services::metrics::FX_LOOKUPS_TOTAL;
use anyhow::anyhow;
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Result of a conversion: the converted amount and the multiplier applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Normalized {
    pub amount: Decimal,
    pub rate: Decimal,
}

/// Validate an ISO-4217 style code and return it upper-cased.
pub fn normalize_currency_code(code: &str) -> Result<String, AppError> {
    let trimmed = code.trim();
    if trimmed.len() != 3 || !trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(AppError::BadRequest(anyhow!(
            "Invalid currency code '{}': expected three letters",
            code
        )));
    }
    Ok(trimmed.to_ascii_uppercase())
}

/// Cache-first currency converter.
///
/// A cold cache with a failing provider is an error, never an implicit rate
/// of one. A stale entry is served only when a refresh fails.
pub struct CurrencyNormalizer {
    cache: Arc<RateCache>,
    provider: Arc<dyn RateProvider>,
    fetch_timeout: Duration,
}

impl CurrencyNormalizer {
    pub fn new(
        cache: Arc<RateCache>,
        provider: Arc<dyn RateProvider>,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            cache,
            provider,
            fetch_timeout,
        }
    }

    /// Convert `amount` from one currency to another.
    #[instrument(skip(self))]
    pub async fn normalize(
        &self,
        amount: Decimal,
        from: &str,
        to: &str,
    ) -> Result<Normalized, AppError> {
        let rate = self.rate(from, to).await?;
        let converted = amount.checked_mul(rate).ok_or_else(|| {
            AppError::BadRequest(anyhow!(
                "Converting {} {} to {} overflows",
                amount,
                from,
                to
            ))
        })?;

        Ok(Normalized {
            amount: converted,
            rate,
        })
    }

    /// Rate to multiply a `from` amount by to get a `to` amount.
    #[instrument(skip(self))]
    pub async fn rate(&self, from: &str, to: &str) -> Result<Decimal, AppError> {
        let from = normalize_currency_code(from)?;
        let to = normalize_currency_code(to)?;

        if from == to {
            FX_LOOKUPS_TOTAL.with_label_values(&["identity"]).inc();
            return Ok(Decimal::ONE);
        }

        let pair = CurrencyPair::new(from, to);
        let stale = match self.cache.lookup(&pair) {
            CacheLookup::Fresh(entry) => {
                FX_LOOKUPS_TOTAL.with_label_values(&["hit"]).inc();
                debug!(%pair, rate = %entry.rate, "Rate cache hit");
                return Ok(entry.rate);
            }
            CacheLookup::Stale(entry) => Some(entry),
            CacheLookup::Miss => None,
        };

        match self.fetch(&pair).await {
            Ok(quote) => {
                let entry = self.cache.store(pair.clone(), quote.rate, quote.as_of);
                FX_LOOKUPS_TOTAL.with_label_values(&["fetched"]).inc();
                debug!(%pair, rate = %entry.rate, as_of = %entry.as_of, "Rate fetched");
                Ok(entry.rate)
            }
            Err(e) => match stale {
                Some(entry) => {
                    FX_LOOKUPS_TOTAL.with_label_values(&["stale_fallback"]).inc();
                    warn!(
                        %pair,
                        rate = %entry.rate,
                        fetched_at = %entry.fetched_at,
                        error = %e,
                        "Rate provider unavailable, using stale cached rate"
                    );
                    Ok(entry.rate)
                }
                None => {
                    FX_LOOKUPS_TOTAL.with_label_values(&["failed"]).inc();
                    Err(AppError::UpstreamUnavailable(anyhow!(
                        "No exchange rate available for {}: {}",
                        pair,
                        e
                    )))
                }
            },
        }
    }

    async fn fetch(&self, pair: &CurrencyPair) -> Result<RateQuote, RateProviderError> {
        tokio::time::timeout(
            self.fetch_timeout,
            self.provider.fetch_rate(&pair.from, &pair.to),
        )
        .await
        .map_err(|_| RateProviderError::Timeout(self.fetch_timeout))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::fx::testing::{FakeProvider, ManualClock};
    use rust_decimal_macros::dec;

    struct Harness {
        normalizer: CurrencyNormalizer,
        provider: Arc<FakeProvider>,
        cache: Arc<RateCache>,
        clock: Arc<ManualClock>,
    }

    fn harness(provider: FakeProvider) -> Harness {
        let clock = Arc::new(ManualClock::default());
        let provider = Arc::new(provider);
        let cache = Arc::new(RateCache::with_clock(
            Duration::from_secs(3600),
            clock.clone(),
        ));
        Harness {
            normalizer: CurrencyNormalizer::new(
                cache.clone(),
                provider.clone(),
                Duration::from_secs(1),
            ),
            provider,
            cache,
            clock,
        }
    }

    #[tokio::test]
    async fn same_currency_is_identity_without_provider_call() {
        let h = harness(FakeProvider::default());

        let result = h.normalizer.normalize(dec!(42.17), "USD", "USD").await.unwrap();

        assert_eq!(result, Normalized { amount: dec!(42.17), rate: Decimal::ONE });
        assert_eq!(h.provider.calls(), 0);
    }

    #[tokio::test]
    async fn converts_eur_to_usd() {
        let h = harness(FakeProvider::default().with_rate("EUR", "USD", dec!(1.10)));

        let result = h.normalizer.normalize(dec!(30), "EUR", "USD").await.unwrap();

        assert_eq!(result.amount, dec!(33.0));
        assert_eq!(result.rate, dec!(1.10));
    }

    #[tokio::test]
    async fn codes_are_case_insensitive() {
        let h = harness(FakeProvider::default().with_rate("EUR", "USD", dec!(1.10)));

        let result = h.normalizer.normalize(dec!(10), "eur", " usd ").await.unwrap();

        assert_eq!(result.amount, dec!(11.0));
        assert!(h.normalizer.rate("usd", "USD").await.unwrap() == Decimal::ONE);
    }

    #[tokio::test]
    async fn malformed_code_is_bad_request() {
        let h = harness(FakeProvider::default());

        for code in ["US", "USDX", "U$D", ""] {
            let err = h.normalizer.rate(code, "USD").await.unwrap_err();
            assert!(matches!(err, AppError::BadRequest(_)), "code {code:?}");
        }
        assert_eq!(h.provider.calls(), 0);
    }

    #[tokio::test]
    async fn rate_is_reused_within_ttl_and_refetched_after() {
        let h = harness(FakeProvider::default().with_rate("EUR", "USD", dec!(1.10)));

        h.normalizer.rate("EUR", "USD").await.unwrap();
        h.clock.advance(Duration::from_secs(3599));
        h.normalizer.rate("EUR", "USD").await.unwrap();
        assert_eq!(h.provider.calls(), 1);

        h.provider.set_rate("EUR", "USD", dec!(1.12));
        h.clock.advance(Duration::from_secs(1));
        let refreshed = h.normalizer.rate("EUR", "USD").await.unwrap();

        assert_eq!(h.provider.calls(), 2);
        assert_eq!(refreshed, dec!(1.12));
    }

    #[tokio::test]
    async fn cold_cache_failure_is_upstream_unavailable() {
        let h = harness(FakeProvider::default().with_rate("EUR", "USD", dec!(1.10)));
        h.provider.set_failing(true);

        let err = h.normalizer.normalize(dec!(30), "EUR", "USD").await.unwrap_err();

        assert!(matches!(err, AppError::UpstreamUnavailable(_)));
        assert!(h.cache.is_empty());
    }

    #[tokio::test]
    async fn stale_rate_is_served_when_refresh_fails() {
        let h = harness(FakeProvider::default().with_rate("EUR", "USD", dec!(1.10)));

        h.normalizer.rate("EUR", "USD").await.unwrap();
        h.clock.advance(Duration::from_secs(7200));
        h.provider.set_failing(true);

        let result = h.normalizer.normalize(dec!(30), "EUR", "USD").await.unwrap();

        assert_eq!(result.rate, dec!(1.10));
        assert_eq!(h.provider.calls(), 2);
    }

    #[tokio::test]
    async fn slow_provider_counts_as_failure() {
        let h = harness(
            FakeProvider::default()
                .with_rate("GBP", "USD", dec!(1.25))
                .with_delay(Duration::from_secs(5)),
        );

        let err = h.normalizer.rate("GBP", "USD").await.unwrap_err();

        assert!(matches!(err, AppError::UpstreamUnavailable(_)));
    }

    #[tokio::test]
    async fn overflow_is_bad_request() {
        let h = harness(FakeProvider::default().with_rate("JPY", "USD", dec!(2)));

        let err = h
            .normalizer
            .normalize(Decimal::MAX, "JPY", "USD")
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
