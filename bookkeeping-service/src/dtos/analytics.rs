use crate::models::Period;
use serde::Deserialize;
use service_core::error::AppError;

/// `?period=7d|1m|1y`; defaults to one month.
#[derive(Debug, Default, Deserialize)]
pub struct PeriodQuery {
    pub period: Option<String>,
}

impl PeriodQuery {
    pub fn period(&self) -> Result<Period, AppError> {
        match self.period.as_deref() {
            None | Some("") => Ok(Period::default()),
            Some(raw) => raw.parse(),
        }
    }
}
