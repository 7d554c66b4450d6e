//! Read-only reporting endpoints. Aggregation happens server-side.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::api::{ApiClient, QueryPairs};
use crate::error::ApiError;

const REPORTS_PATH: &str = "/api/reports";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueSummary {
    pub total_revenue: f64,
    pub order_count: u64,
    #[serde(default)]
    pub average_order_value: f64,
    #[serde(default)]
    pub cancelled_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailySales {
    pub date: NaiveDate,
    pub revenue: f64,
    pub order_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopProduct {
    pub product_id: i64,
    pub product_name: String,
    pub quantity_sold: u64,
    #[serde(default)]
    pub revenue: f64,
}

/// Inclusive date range for a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self, ApiError> {
        if from > to {
            return Err(ApiError::InvalidRequest(format!(
                "Report range starts after it ends ({from} > {to})"
            )));
        }
        Ok(Self { from, to })
    }

    fn to_query(self) -> QueryPairs {
        vec![
            ("from", self.from.format("%Y-%m-%d").to_string()),
            ("to", self.to.format("%Y-%m-%d").to_string()),
        ]
    }
}

pub async fn revenue_summary(api: &ApiClient, range: DateRange) -> Result<RevenueSummary, ApiError> {
    api.get(&format!("{REPORTS_PATH}/revenue"), &range.to_query())
        .await
}

pub async fn daily_sales(api: &ApiClient, range: DateRange) -> Result<Vec<DailySales>, ApiError> {
    api.get(&format!("{REPORTS_PATH}/daily-sales"), &range.to_query())
        .await
}

pub async fn top_products(
    api: &ApiClient,
    range: DateRange,
    limit: u32,
) -> Result<Vec<TopProduct>, ApiError> {
    let mut query = range.to_query();
    query.push(("limit", limit.clamp(1, 100).to_string()));
    api.get(&format!("{REPORTS_PATH}/top-products"), &query).await
}
