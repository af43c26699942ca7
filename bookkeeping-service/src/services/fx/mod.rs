//! Currency conversion: rate cache, external provider and the normalizer
//! that ties them together.

mod cache;
mod normalizer;
mod provider;

pub use cache::{CacheLookup, CachedRate, Clock, CurrencyPair, RateCache, SystemClock};
pub use normalizer::{normalize_currency_code, CurrencyNormalizer, Normalized};
pub use provider::{HttpRateProvider, RateProvider, RateProviderError, RateQuote};
