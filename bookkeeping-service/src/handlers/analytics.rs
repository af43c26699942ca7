use super::record_error;
use crate::dtos::PeriodQuery;
use crate::middleware::UserId;
use crate::models::{GroupDimension, GroupReport, SummaryReport, TrendReport};
use crate::startup::AppState;
use axum::{
    extract::{Query, State},
    Json,
};
use service_core::error::AppError;

pub async fn summary(
    State(state): State<AppState>,
    user_id: UserId,
    Query(query): Query<PeriodQuery>,
) -> Result<Json<SummaryReport>, AppError> {
    let period = query.period().map_err(record_error)?;
    let report = state
        .analytics
        .summary(user_id.0, period)
        .await
        .map_err(record_error)?;
    Ok(Json(report))
}

async fn grouped(
    state: AppState,
    user_id: UserId,
    query: PeriodQuery,
    dimension: GroupDimension,
) -> Result<Json<GroupReport>, AppError> {
    let period = query.period().map_err(record_error)?;
    let report = state
        .analytics
        .by_group(user_id.0, period, dimension)
        .await
        .map_err(record_error)?;
    Ok(Json(report))
}

pub async fn by_category(
    State(state): State<AppState>,
    user_id: UserId,
    Query(query): Query<PeriodQuery>,
) -> Result<Json<GroupReport>, AppError> {
    grouped(state, user_id, query, GroupDimension::Category).await
}

pub async fn by_company(
    State(state): State<AppState>,
    user_id: UserId,
    Query(query): Query<PeriodQuery>,
) -> Result<Json<GroupReport>, AppError> {
    grouped(state, user_id, query, GroupDimension::Company).await
}

pub async fn by_receiver(
    State(state): State<AppState>,
    user_id: UserId,
    Query(query): Query<PeriodQuery>,
) -> Result<Json<GroupReport>, AppError> {
    grouped(state, user_id, query, GroupDimension::Receiver).await
}

pub async fn by_tag(
    State(state): State<AppState>,
    user_id: UserId,
    Query(query): Query<PeriodQuery>,
) -> Result<Json<GroupReport>, AppError> {
    grouped(state, user_id, query, GroupDimension::Tag).await
}

pub async fn trend(
    State(state): State<AppState>,
    user_id: UserId,
    Query(query): Query<PeriodQuery>,
) -> Result<Json<TrendReport>, AppError> {
    let period = query.period().map_err(record_error)?;
    let report = state
        .analytics
        .trend(user_id.0, period)
        .await
        .map_err(record_error)?;
    Ok(Json(report))
}
