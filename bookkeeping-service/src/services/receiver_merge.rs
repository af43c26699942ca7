//! Receiver merge coordinator.

use crate::models::{InvoiceReceiver, MergeOutcome, MergeReceivers};
use crate::services::metrics::{DB_QUERY_DURATION, RECEIVER_MERGES_TOTAL};
use crate::services::Database;
use anyhow::anyhow;
use service_core::error::AppError;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Folds duplicate receivers into one, moving their invoices along.
///
/// Target and sources are row-locked, invoices are repointed and sources
/// are hard-deleted inside a single transaction, so a concurrent report sees
/// either the state before the merge or the state after it.
#[derive(Clone)]
pub struct ReceiverMergeCoordinator {
    db: Database,
}

impl ReceiverMergeCoordinator {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[instrument(
        skip(self, request),
        fields(user_id = %request.user_id, target_id = %request.target_id, sources = request.source_ids.len())
    )]
    pub async fn merge(&self, request: &MergeReceivers) -> Result<MergeOutcome, AppError> {
        let result = self.run(request).await;

        let outcome = match &result {
            Ok(_) => "merged",
            Err(AppError::BadRequest(_) | AppError::NotFound(_)) => "rejected",
            Err(_) => "failed",
        };
        RECEIVER_MERGES_TOTAL.with_label_values(&[outcome]).inc();

        if let Err(e) = &result {
            warn!(error = %e, outcome, "Receiver merge did not complete");
        }

        result
    }

    async fn run(&self, request: &MergeReceivers) -> Result<MergeOutcome, AppError> {
        request.validate_target()?;

        let timer = DB_QUERY_DURATION
            .with_label_values(&["merge_receivers"])
            .start_timer();

        // Dropping `tx` on any early return rolls back.
        let mut tx = self.db.pool().begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow!("Failed to begin transaction: {}", e))
        })?;

        let owned = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT receiver_id
            FROM invoice_receivers
            WHERE receiver_id = $1 AND user_id = $2 AND deleted_utc IS NULL
            "#,
        )
        .bind(request.target_id)
        .bind(request.user_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow!("Failed to load target receiver: {}", e)))?;

        if owned.is_none() {
            return Err(AppError::NotFound(anyhow!(
                "Receiver {} not found",
                request.target_id
            )));
        }

        request.validate_sources()?;

        // Target and sources are locked together in id order, so two merges
        // over the same receivers always take their locks in the same order.
        let locked = sqlx::query_as::<_, InvoiceReceiver>(
            r#"
            SELECT receiver_id, user_id, name, is_organization, alternate_names, created_utc
            FROM invoice_receivers
            WHERE user_id = $1
              AND (receiver_id = ANY($3) OR (receiver_id = $2 AND deleted_utc IS NULL))
            ORDER BY receiver_id
            FOR UPDATE
            "#,
        )
        .bind(request.user_id)
        .bind(request.target_id)
        .bind(&request.source_ids)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow!("Failed to lock receivers: {}", e)))?;

        let (mut targets, sources): (Vec<_>, Vec<_>) = locked
            .into_iter()
            .partition(|r| r.receiver_id == request.target_id);

        // The target can vanish while we wait on its lock.
        let target = targets.pop().ok_or_else(|| {
            AppError::NotFound(anyhow!("Receiver {} not found", request.target_id))
        })?;

        if sources.len() != request.source_ids.len() {
            let missing: Vec<String> = request
                .source_ids
                .iter()
                .filter(|id| !sources.iter().any(|r| r.receiver_id == **id))
                .map(Uuid::to_string)
                .collect();
            return Err(AppError::NotFound(anyhow!(
                "Source receivers not found: {}",
                missing.join(", ")
            )));
        }

        let invoices_updated = sqlx::query(
            r#"
            UPDATE invoices
            SET receiver_id = $1
            WHERE user_id = $2 AND receiver_id = ANY($3)
            "#,
        )
        .bind(request.target_id)
        .bind(request.user_id)
        .bind(&request.source_ids)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::TransactionFailed(anyhow!("Failed to reassign invoices: {}", e)))?
        .rows_affected();

        // The receiver foreign key has no cascade: if anything still points at
        // a source this fails and the whole merge rolls back.
        let deleted = sqlx::query(
            r#"
            DELETE FROM invoice_receivers
            WHERE user_id = $1 AND receiver_id = ANY($2)
            "#,
        )
        .bind(request.user_id)
        .bind(&request.source_ids)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            AppError::TransactionFailed(anyhow!("Failed to delete source receivers: {}", e))
        })?
        .rows_affected();

        if deleted != request.source_ids.len() as u64 {
            return Err(AppError::TransactionFailed(anyhow!(
                "Expected to delete {} receivers, deleted {}",
                request.source_ids.len(),
                deleted
            )));
        }

        tx.commit().await.map_err(|e| {
            AppError::TransactionFailed(anyhow!("Failed to commit receiver merge: {}", e))
        })?;

        timer.observe_duration();

        info!(
            receiver_id = %target.receiver_id,
            merged_count = request.source_ids.len(),
            invoices_updated,
            "Receivers merged"
        );

        Ok(MergeOutcome {
            receiver: target,
            merged_count: request.source_ids.len(),
            invoices_updated,
        })
    }
}
