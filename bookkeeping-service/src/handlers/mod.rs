//! HTTP handlers for bookkeeping-service.

pub mod analytics;
pub mod health;
pub mod invoices;
pub mod labels;
pub mod receivers;

use crate::services::metrics::ERRORS_TOTAL;
use service_core::error::AppError;

/// Count a failed request by error kind and hand the error back.
pub(crate) fn record_error(e: AppError) -> AppError {
    ERRORS_TOTAL.with_label_values(&[e.kind()]).inc();
    e
}

/// Trimmed copy of a required name; whitespace-only is rejected.
pub(crate) fn required_name(raw: &str, field: &str) -> Result<String, AppError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(record_error(AppError::BadRequest(anyhow::anyhow!(
            "{} cannot be blank",
            field
        ))));
    }
    Ok(name.to_string())
}
