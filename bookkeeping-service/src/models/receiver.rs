//! Invoice receiver model and merge request.

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use sqlx::FromRow;
use std::collections::HashSet;
use uuid::Uuid;

/// A payer/payee identity invoices can point at.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InvoiceReceiver {
    pub receiver_id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub is_organization: bool,
    pub alternate_names: Vec<String>,
    pub created_utc: DateTime<Utc>,
}

/// Input for creating a receiver.
#[derive(Debug, Clone)]
pub struct CreateReceiver {
    pub user_id: Uuid,
    pub name: String,
    pub is_organization: bool,
    pub alternate_names: Vec<String>,
}

/// Fold `source_ids` into `target_id` for one user.
#[derive(Debug, Clone)]
pub struct MergeReceivers {
    pub user_id: Uuid,
    pub target_id: Uuid,
    pub source_ids: Vec<Uuid>,
}

impl MergeReceivers {
    /// Checks that need no database access, in precedence order. Ownership
    /// of the target is checked by the caller before the source list is
    /// looked at.
    pub fn validate_target(&self) -> Result<(), AppError> {
        if self.target_id.is_nil() {
            return Err(AppError::NotFound(anyhow!("Target receiver not found")));
        }
        Ok(())
    }

    pub fn validate_sources(&self) -> Result<(), AppError> {
        if self.source_ids.is_empty() {
            return Err(AppError::BadRequest(anyhow!(
                "At least one source receiver is required"
            )));
        }

        if self.source_ids.contains(&self.target_id) {
            return Err(AppError::BadRequest(anyhow!(
                "A receiver cannot be merged into itself"
            )));
        }

        let mut seen = HashSet::with_capacity(self.source_ids.len());
        if let Some(dup) = self.source_ids.iter().find(|id| !seen.insert(**id)) {
            return Err(AppError::BadRequest(anyhow!(
                "Source receiver {} listed more than once",
                dup
            )));
        }

        Ok(())
    }
}

/// Result of a completed merge.
#[derive(Debug, Clone, Serialize)]
pub struct MergeOutcome {
    pub receiver: InvoiceReceiver,
    pub merged_count: usize,
    pub invoices_updated: u64,
}
