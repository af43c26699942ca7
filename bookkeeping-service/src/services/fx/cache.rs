//! Process-wide exchange rate cache with lazy, time-based staleness.

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;

/// Source of "now" for staleness checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Ordered (from, to) currency pair. EUR->USD and USD->EUR are separate
/// entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CurrencyPair {
    pub from: String,
    pub to: String,
}

impl CurrencyPair {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

impl std::fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}->{}", self.from, self.to)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedRate {
    pub rate: Decimal,
    /// Date the provider says the rate is for.
    pub as_of: NaiveDate,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    Fresh(CachedRate),
    /// Present but older than the TTL; only usable as a degraded fallback.
    Stale(CachedRate),
    Miss,
}

/// Rates keyed by currency pair.
///
/// The map is sharded with a read-write lock per shard, so a reader never
/// sees a half-written entry and concurrent inserts for different pairs do
/// not contend. Entries are never evicted; staleness is decided on lookup.
pub struct RateCache {
    entries: DashMap<CurrencyPair, CachedRate>,
    ttl: TimeDelta,
    clock: Arc<dyn Clock>,
}

impl RateCache {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            ttl: TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX),
            clock,
        }
    }

    pub fn lookup(&self, pair: &CurrencyPair) -> CacheLookup {
        // Clone out of the shard guard so no lock outlives this call.
        let Some(entry) = self.entries.get(pair).map(|e| e.value().clone()) else {
            return CacheLookup::Miss;
        };

        if self.clock.now() - entry.fetched_at < self.ttl {
            CacheLookup::Fresh(entry)
        } else {
            CacheLookup::Stale(entry)
        }
    }

    /// Record a freshly fetched rate, replacing any previous entry.
    pub fn store(&self, pair: CurrencyPair, rate: Decimal, as_of: NaiveDate) -> CachedRate {
        let entry = CachedRate {
            rate,
            as_of,
            fetched_at: self.clock.now(),
        };
        self.entries.insert(pair, entry.clone());
        entry
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for RateCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TTL)
    }
}
