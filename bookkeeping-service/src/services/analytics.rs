//! Aggregation engine: summary, grouped and trend rollups.
//!
//! Every report is a single set-based query over the already-normalized item
//! amounts. Invoices are first collapsed to one row each (`invoice_totals`),
//! so an invoice is counted once per group it falls into.

use crate::models::{
    GroupDimension, GroupReport, GroupTotalsRow, Period, ReportWindow, StatusTotalsRow,
    SummaryReport, TrendPoint, TrendReport, TrendRow,
};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::Database;
use anyhow::anyhow;
use chrono::Utc;
use service_core::error::AppError;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Per-invoice normalized totals for one user and window.
///
/// Binds: `$1` user id, `$2` window start, `$3` window end. The relevant
/// date is the due date when set, otherwise the UTC creation date.
const INVOICE_TOTALS_CTE: &str = r#"
    WITH invoice_totals AS (
        SELECT
            i.invoice_id,
            i.status,
            i.category_id,
            i.company_id,
            i.receiver_id,
            COALESCE(i.due_date, (i.created_utc AT TIME ZONE 'UTC')::date) AS relevant_date,
            COALESCE(SUM(it.target_amount), 0) AS total
        FROM invoices i
        LEFT JOIN invoice_items it ON it.invoice_id = i.invoice_id
        WHERE i.user_id = $1
          AND i.deleted_utc IS NULL
          AND COALESCE(i.due_date, (i.created_utc AT TIME ZONE 'UTC')::date) BETWEEN $2 AND $3
        GROUP BY i.invoice_id
    )
"#;

/// Status-split sums over `invoice_totals t`.
const STATUS_TOTALS_SELECT: &str = r#"
        COALESCE(SUM(t.total), 0) AS total_amount,
        COALESCE(SUM(t.total) FILTER (WHERE t.status = 'paid'), 0) AS paid_amount,
        COALESCE(SUM(t.total) FILTER (WHERE t.status = 'unpaid'), 0) AS unpaid_amount,
        COALESCE(SUM(t.total) FILTER (WHERE t.status = 'overdue'), 0) AS overdue_amount,
        COUNT(t.invoice_id) AS invoice_count,
        COUNT(t.invoice_id) FILTER (WHERE t.status = 'paid') AS paid_count,
        COUNT(t.invoice_id) FILTER (WHERE t.status = 'unpaid') AS unpaid_count,
        COUNT(t.invoice_id) FILTER (WHERE t.status = 'overdue') AS overdue_count
"#;

/// Join clause and selected columns for one grouping dimension. A label
/// that is missing or soft-deleted leaves `g` NULL, which is the
/// uncategorized group.
fn dimension_join(dimension: GroupDimension) -> (&'static str, &'static str) {
    match dimension {
        GroupDimension::Category => (
            "LEFT JOIN categories g \
               ON g.category_id = t.category_id AND g.user_id = $1 AND g.deleted_utc IS NULL",
            "g.category_id AS group_id, g.name AS name, g.color AS color",
        ),
        GroupDimension::Company => (
            "LEFT JOIN companies g \
               ON g.company_id = t.company_id AND g.user_id = $1 AND g.deleted_utc IS NULL",
            "g.company_id AS group_id, g.name AS name, NULL::varchar AS color",
        ),
        GroupDimension::Receiver => (
            "LEFT JOIN invoice_receivers g \
               ON g.receiver_id = t.receiver_id AND g.user_id = $1 AND g.deleted_utc IS NULL",
            "g.receiver_id AS group_id, g.name AS name, NULL::varchar AS color",
        ),
        // One row per (invoice, live tag): an invoice counts in full under
        // each of its tags.
        GroupDimension::Tag => (
            "LEFT JOIN (invoice_tags x \
                 JOIN tags g ON g.tag_id = x.tag_id AND g.user_id = $1 AND g.deleted_utc IS NULL) \
               ON x.invoice_id = t.invoice_id",
            "g.tag_id AS group_id, g.name AS name, g.color AS color",
        ),
    }
}

fn group_query(dimension: GroupDimension) -> String {
    let (join, columns) = dimension_join(dimension);
    format!(
        "{INVOICE_TOTALS_CTE}
        SELECT {columns},
        {STATUS_TOTALS_SELECT}
        FROM invoice_totals t
        {join}
        GROUP BY 1, 2, 3
        ORDER BY total_amount DESC, name"
    )
}

/// Stateless report builder over the invoice store.
#[derive(Clone)]
pub struct AggregationEngine {
    db: Database,
}

impl AggregationEngine {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn window(period: Period) -> ReportWindow {
        period.window_ending(Utc::now().date_naive())
    }

    #[instrument(skip(self), fields(user_id = %user_id, period = period.as_str()))]
    pub async fn summary(&self, user_id: Uuid, period: Period) -> Result<SummaryReport, AppError> {
        let window = Self::window(period);
        let totals = self.status_totals(user_id, window).await?;
        Ok(SummaryReport::new(period, window, totals))
    }

    async fn status_totals(
        &self,
        user_id: Uuid,
        window: ReportWindow,
    ) -> Result<StatusTotalsRow, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["analytics_summary"])
            .start_timer();

        let totals = sqlx::query_as::<_, StatusTotalsRow>(&format!(
            "{INVOICE_TOTALS_CTE} SELECT {STATUS_TOTALS_SELECT} FROM invoice_totals t"
        ))
        .bind(user_id)
        .bind(window.start_date)
        .bind(window.end_date)
        .fetch_one(self.db.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow!("Failed to compute summary: {}", e)))?;

        timer.observe_duration();

        Ok(totals)
    }

    #[instrument(
        skip(self),
        fields(user_id = %user_id, period = period.as_str(), dimension = dimension.as_str())
    )]
    pub async fn by_group(
        &self,
        user_id: Uuid,
        period: Period,
        dimension: GroupDimension,
    ) -> Result<GroupReport, AppError> {
        let window = Self::window(period);

        let timer = DB_QUERY_DURATION
            .with_label_values(&["analytics_by_group"])
            .start_timer();

        let rows = sqlx::query_as::<_, GroupTotalsRow>(&group_query(dimension))
            .bind(user_id)
            .bind(window.start_date)
            .bind(window.end_date)
            .fetch_all(self.db.pool())
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow!(
                    "Failed to compute {} report: {}",
                    dimension.as_str(),
                    e
                ))
            })?;

        timer.observe_duration();

        debug!(groups = rows.len(), "Grouped report computed");

        Ok(GroupReport::from_rows(period, dimension, window, rows))
    }

    #[instrument(skip(self), fields(user_id = %user_id, period = period.as_str()))]
    pub async fn trend(&self, user_id: Uuid, period: Period) -> Result<TrendReport, AppError> {
        let window = Self::window(period);
        let granularity = period.trend_granularity();

        let timer = DB_QUERY_DURATION
            .with_label_values(&["analytics_trend"])
            .start_timer();

        let rows = sqlx::query_as::<_, TrendRow>(&format!(
            "{INVOICE_TOTALS_CTE}
            SELECT date_trunc($4, t.relevant_date::timestamp)::date AS bucket_start,
            {STATUS_TOTALS_SELECT}
            FROM invoice_totals t
            GROUP BY 1
            ORDER BY 1"
        ))
        .bind(user_id)
        .bind(window.start_date)
        .bind(window.end_date)
        .bind(granularity.as_str())
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow!("Failed to compute trend: {}", e)))?;

        timer.observe_duration();

        Ok(TrendReport {
            period,
            granularity,
            start_date: window.start_date,
            end_date: window.end_date,
            points: rows.into_iter().map(TrendPoint::from).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_dimension_selects_the_group_columns() {
        for dimension in [
            GroupDimension::Category,
            GroupDimension::Company,
            GroupDimension::Receiver,
            GroupDimension::Tag,
        ] {
            let sql = group_query(dimension);
            assert!(sql.contains("AS group_id"), "{}", dimension.as_str());
            assert!(sql.contains("AS color"), "{}", dimension.as_str());
            assert!(sql.contains("g.deleted_utc IS NULL"), "{}", dimension.as_str());
        }
    }

    #[test]
    fn tag_dimension_joins_through_link_table() {
        let sql = group_query(GroupDimension::Tag);
        assert!(sql.contains("invoice_tags x"));
        assert!(!group_query(GroupDimension::Category).contains("invoice_tags"));
    }
}
