use super::{record_error, required_name};
use crate::dtos::CreateLabelRequest;
use crate::middleware::UserId;
use crate::models::{Category, Company, CreateLabel, Tag};
use crate::startup::AppState;
use axum::{extract::State, http::StatusCode, Json};
use service_core::error::AppError;
use validator::Validate;

fn to_input(user_id: UserId, req: CreateLabelRequest) -> Result<CreateLabel, AppError> {
    req.validate().map_err(|e| record_error(e.into()))?;
    Ok(CreateLabel {
        user_id: user_id.0,
        name: required_name(&req.name, "name")?,
        color: req.color,
    })
}

pub async fn create_category(
    State(state): State<AppState>,
    user_id: UserId,
    Json(req): Json<CreateLabelRequest>,
) -> Result<(StatusCode, Json<Category>), AppError> {
    let input = to_input(user_id, req)?;
    let category = state.db.create_category(&input).await.map_err(record_error)?;
    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn create_company(
    State(state): State<AppState>,
    user_id: UserId,
    Json(req): Json<CreateLabelRequest>,
) -> Result<(StatusCode, Json<Company>), AppError> {
    let input = to_input(user_id, req)?;
    let company = state.db.create_company(&input).await.map_err(record_error)?;
    Ok((StatusCode::CREATED, Json(company)))
}

pub async fn create_tag(
    State(state): State<AppState>,
    user_id: UserId,
    Json(req): Json<CreateLabelRequest>,
) -> Result<(StatusCode, Json<Tag>), AppError> {
    let input = to_input(user_id, req)?;
    let tag = state.db.create_tag(&input).await.map_err(record_error)?;
    Ok((StatusCode::CREATED, Json(tag)))
}
