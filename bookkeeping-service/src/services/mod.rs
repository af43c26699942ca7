//! Services module for bookkeeping-service.

pub mod analytics;
pub mod database;
pub mod fx;
pub mod invoices;
pub mod line_items;
pub mod metrics;
pub mod receiver_merge;

pub use analytics::AggregationEngine;
pub use database::Database;
pub use fx::{CurrencyNormalizer, HttpRateProvider, RateCache, RateProvider};
pub use invoices::InvoiceService;
pub use line_items::LineItemAmountEngine;
pub use metrics::{get_metrics, init_metrics};
pub use receiver_merge::ReceiverMergeCoordinator;
