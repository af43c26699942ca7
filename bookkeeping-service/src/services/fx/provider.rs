//! External exchange-rate provider.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use reqwest::Client;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use service_core::error::AppError;
use service_core::observability::TracedClientExt;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// A rate as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateQuote {
    /// Units of the symbol currency per one unit of the base currency.
    pub rate: Decimal,
    pub as_of: NaiveDate,
}

#[derive(Error, Debug)]
pub enum RateProviderError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Provider returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Rate for {0} missing from provider response")]
    MissingRate(String),

    #[error("Invalid rate from provider: {0}")]
    InvalidRate(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

/// Anything that can quote a current conversion rate.
#[async_trait]
pub trait RateProvider: Send + Sync {
    async fn fetch_rate(&self, base: &str, symbol: &str) -> Result<RateQuote, RateProviderError>;
}

/// Wire shape of `GET /latest?base=..&symbols=..`.
#[derive(Debug, Deserialize)]
struct LatestRatesResponse {
    rates: HashMap<String, f64>,
    date: Option<NaiveDate>,
}

/// Client for a Frankfurter-style rates API.
#[derive(Clone)]
pub struct HttpRateProvider {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpRateProvider {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }
}

#[async_trait]
impl RateProvider for HttpRateProvider {
    #[tracing::instrument(skip(self), fields(provider = %self.base_url))]
    async fn fetch_rate(&self, base: &str, symbol: &str) -> Result<RateQuote, RateProviderError> {
        let url = format!("{}/latest", self.base_url);

        let response = self
            .client
            .traced_get(&url)
            .query(&[("base", base), ("symbols", symbol)])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RateProviderError::Timeout(self.timeout)
                } else {
                    RateProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RateProviderError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let payload: LatestRatesResponse = response
            .json()
            .await
            .map_err(|e| RateProviderError::InvalidRate(format!("Malformed response: {}", e)))?;

        let raw = payload
            .rates
            .get(symbol)
            .copied()
            .ok_or_else(|| RateProviderError::MissingRate(symbol.to_string()))?;

        let rate = Decimal::from_f64(raw)
            .filter(|r| r.is_sign_positive() && !r.is_zero())
            .ok_or_else(|| RateProviderError::InvalidRate(raw.to_string()))?;

        let as_of = payload.date.unwrap_or_else(|| Utc::now().date_naive());

        tracing::debug!(%rate, %as_of, "Fetched exchange rate");

        Ok(RateQuote { rate, as_of })
    }
}
