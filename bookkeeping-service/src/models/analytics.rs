//! Reporting periods, grouping dimensions and report shapes.

use anyhow::anyhow;
use chrono::{Days, Months, NaiveDate};
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};
use service_core::error::AppError;
use sqlx::FromRow;
use std::str::FromStr;
use uuid::Uuid;

/// Look-back window for a report, ending today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Period {
    SevenDays,
    #[default]
    OneMonth,
    OneYear,
}

impl Period {
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::SevenDays => "7d",
            Period::OneMonth => "1m",
            Period::OneYear => "1y",
        }
    }

    /// Calendar-day window `[today - N, today]`, both ends inclusive.
    pub fn window_ending(&self, today: NaiveDate) -> ReportWindow {
        let start = match self {
            Period::SevenDays => today.checked_sub_days(Days::new(7)),
            Period::OneMonth => today.checked_sub_months(Months::new(1)),
            Period::OneYear => today.checked_sub_months(Months::new(12)),
        }
        .unwrap_or(NaiveDate::MIN);

        ReportWindow {
            start_date: start,
            end_date: today,
        }
    }

    /// Trend bucket size that keeps the chart readable for this period.
    pub fn trend_granularity(&self) -> TrendGranularity {
        match self {
            Period::SevenDays | Period::OneMonth => TrendGranularity::Day,
            Period::OneYear => TrendGranularity::Month,
        }
    }
}

impl FromStr for Period {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "7d" => Ok(Period::SevenDays),
            "1m" => Ok(Period::OneMonth),
            "1y" => Ok(Period::OneYear),
            other => Err(AppError::BadRequest(anyhow!(
                "Invalid period '{}': expected one of 7d, 1m, 1y",
                other
            ))),
        }
    }
}

impl Serialize for Period {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Inclusive date range a report covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportWindow {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// What a grouped report buckets invoices by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupDimension {
    Category,
    Company,
    Receiver,
    /// Not exclusive: an invoice counts in full under every tag it carries.
    Tag,
}

impl GroupDimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupDimension::Category => "category",
            GroupDimension::Company => "company",
            GroupDimension::Receiver => "receiver",
            GroupDimension::Tag => "tag",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendGranularity {
    Day,
    Month,
}

impl TrendGranularity {
    /// Argument for Postgres `date_trunc`.
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendGranularity::Day => "day",
            TrendGranularity::Month => "month",
        }
    }
}

/// Aggregate row shared by the summary and trend queries.
#[derive(Debug, Clone, FromRow)]
pub struct StatusTotalsRow {
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
    pub unpaid_amount: Decimal,
    pub overdue_amount: Decimal,
    pub invoice_count: i64,
    pub paid_count: i64,
    pub unpaid_count: i64,
    pub overdue_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryReport {
    pub period: Period,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
    pub unpaid_amount: Decimal,
    pub overdue_amount: Decimal,
    pub invoice_count: i64,
    pub paid_count: i64,
    pub unpaid_count: i64,
    pub overdue_count: i64,
}

impl SummaryReport {
    pub fn new(period: Period, window: ReportWindow, totals: StatusTotalsRow) -> Self {
        Self {
            period,
            start_date: window.start_date,
            end_date: window.end_date,
            total_amount: totals.total_amount,
            paid_amount: totals.paid_amount,
            unpaid_amount: totals.unpaid_amount,
            overdue_amount: totals.overdue_amount,
            invoice_count: totals.invoice_count,
            paid_count: totals.paid_count,
            unpaid_count: totals.unpaid_count,
            overdue_count: totals.overdue_count,
        }
    }
}

/// One row per group value; `group_id` is NULL for invoices without one.
#[derive(Debug, Clone, FromRow)]
pub struct GroupTotalsRow {
    pub group_id: Option<Uuid>,
    pub name: Option<String>,
    pub color: Option<String>,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
    pub unpaid_amount: Decimal,
    pub overdue_amount: Decimal,
    pub invoice_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupItem {
    pub id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
    pub unpaid_amount: Decimal,
    pub overdue_amount: Decimal,
    pub invoice_count: i64,
}

pub const UNCATEGORIZED_NAME: &str = "Uncategorized";

#[derive(Debug, Clone, Serialize)]
pub struct GroupReport {
    pub period: Period,
    pub dimension: GroupDimension,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub items: Vec<GroupItem>,
    /// Absent when invoices without the dimension sum to zero.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uncategorized: Option<GroupItem>,
}

impl GroupReport {
    /// Split store rows into named groups and the synthetic uncategorized
    /// bucket.
    pub fn from_rows(
        period: Period,
        dimension: GroupDimension,
        window: ReportWindow,
        rows: Vec<GroupTotalsRow>,
    ) -> Self {
        let mut items = Vec::with_capacity(rows.len());
        let mut uncategorized: Option<GroupItem> = None;

        for row in rows {
            match row.group_id {
                Some(id) => items.push(GroupItem {
                    id,
                    name: row.name.unwrap_or_default(),
                    color: row.color,
                    total_amount: row.total_amount,
                    paid_amount: row.paid_amount,
                    unpaid_amount: row.unpaid_amount,
                    overdue_amount: row.overdue_amount,
                    invoice_count: row.invoice_count,
                }),
                None => {
                    let bucket = uncategorized.get_or_insert_with(|| GroupItem {
                        id: Uuid::nil(),
                        name: UNCATEGORIZED_NAME.to_string(),
                        color: None,
                        total_amount: Decimal::ZERO,
                        paid_amount: Decimal::ZERO,
                        unpaid_amount: Decimal::ZERO,
                        overdue_amount: Decimal::ZERO,
                        invoice_count: 0,
                    });
                    bucket.total_amount += row.total_amount;
                    bucket.paid_amount += row.paid_amount;
                    bucket.unpaid_amount += row.unpaid_amount;
                    bucket.overdue_amount += row.overdue_amount;
                    bucket.invoice_count += row.invoice_count;
                }
            }
        }

        Self {
            period,
            dimension,
            start_date: window.start_date,
            end_date: window.end_date,
            items,
            uncategorized: uncategorized.filter(|bucket| !bucket.total_amount.is_zero()),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct TrendRow {
    pub bucket_start: NaiveDate,
    #[sqlx(flatten)]
    pub totals: StatusTotalsRow,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrendPoint {
    pub bucket_start: NaiveDate,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
    pub unpaid_amount: Decimal,
    pub overdue_amount: Decimal,
    pub invoice_count: i64,
}

impl From<TrendRow> for TrendPoint {
    fn from(row: TrendRow) -> Self {
        Self {
            bucket_start: row.bucket_start,
            total_amount: row.totals.total_amount,
            paid_amount: row.totals.paid_amount,
            unpaid_amount: row.totals.unpaid_amount,
            overdue_amount: row.totals.overdue_amount,
            invoice_count: row.totals.invoice_count,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TrendReport {
    pub period: Period,
    pub granularity: TrendGranularity,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub points: Vec<TrendPoint>,
}
