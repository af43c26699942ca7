use super::{record_error, required_name};
use crate::dtos::{CreateReceiverRequest, MergeReceiversRequest};
use crate::middleware::UserId;
use crate::models::{CreateReceiver, InvoiceReceiver, MergeOutcome, MergeReceivers};
use crate::startup::AppState;
use anyhow::anyhow;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

pub async fn create_receiver(
    State(state): State<AppState>,
    user_id: UserId,
    Json(req): Json<CreateReceiverRequest>,
) -> Result<(StatusCode, Json<InvoiceReceiver>), AppError> {
    req.validate().map_err(|e| record_error(e.into()))?;

    let input = CreateReceiver {
        user_id: user_id.0,
        name: required_name(&req.name, "name")?,
        is_organization: req.is_organization,
        alternate_names: req
            .alternate_names
            .into_iter()
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .collect(),
    };

    let receiver = state.db.create_receiver(&input).await.map_err(record_error)?;
    Ok((StatusCode::CREATED, Json(receiver)))
}

pub async fn list_receivers(
    State(state): State<AppState>,
    user_id: UserId,
) -> Result<Json<Vec<InvoiceReceiver>>, AppError> {
    let receivers = state
        .db
        .list_receivers(user_id.0)
        .await
        .map_err(record_error)?;
    Ok(Json(receivers))
}

pub async fn get_receiver(
    State(state): State<AppState>,
    user_id: UserId,
    Path(receiver_id): Path<Uuid>,
) -> Result<Json<InvoiceReceiver>, AppError> {
    let receiver = state
        .db
        .get_receiver(user_id.0, receiver_id)
        .await
        .map_err(record_error)?
        .ok_or_else(|| {
            record_error(AppError::NotFound(anyhow!(
                "Receiver {} not found",
                receiver_id
            )))
        })?;
    Ok(Json(receiver))
}

pub async fn delete_receiver(
    State(state): State<AppState>,
    user_id: UserId,
    Path(receiver_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let deleted = state
        .db
        .delete_receiver(user_id.0, receiver_id)
        .await
        .map_err(record_error)?;

    if !deleted {
        return Err(record_error(AppError::NotFound(anyhow!(
            "Receiver {} not found",
            receiver_id
        ))));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn merge_receivers(
    State(state): State<AppState>,
    user_id: UserId,
    Json(req): Json<MergeReceiversRequest>,
) -> Result<Json<MergeOutcome>, AppError> {
    let request = MergeReceivers {
        user_id: user_id.0,
        target_id: req.target_id,
        source_ids: req.source_ids,
    };

    let outcome = state.merges.merge(&request).await.map_err(record_error)?;
    Ok(Json(outcome))
}
