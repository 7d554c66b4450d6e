//! Salary records.
//!
//! Pay is computed by the backend (`calculate`); the client lists records,
//! asks for a calculation and marks records as paid.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::api::{ApiClient, ListParams, Listing};
use crate::error::ApiError;

const SALARIES_PATH: &str = "/api/salaries";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalaryRecord {
    pub id: i64,
    pub employee_id: i64,
    #[serde(default)]
    pub employee_name: Option<String>,
    /// Pay period in `YYYY-MM` form.
    pub period: String,
    #[serde(default)]
    pub hours_worked: f64,
    #[serde(default)]
    pub base_amount: f64,
    #[serde(default)]
    pub bonus: f64,
    #[serde(default)]
    pub deductions: f64,
    pub total_amount: f64,
    #[serde(default)]
    pub paid: bool,
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
}

/// Format a date as the `YYYY-MM` pay period it falls in.
pub fn pay_period(date: NaiveDate) -> String {
    format!("{:04}-{:02}", date.year(), date.month())
}

fn validate_period(period: &str) -> Result<(), ApiError> {
    NaiveDate::parse_from_str(&format!("{period}-01"), "%Y-%m-%d")
        .map(|_| ())
        .map_err(|_| ApiError::InvalidRequest(format!("Invalid pay period '{period}', expected YYYY-MM")))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SalaryFilter {
    pub list: ListParams,
    pub employee_id: Option<i64>,
    pub period: Option<String>,
}

pub async fn list_salaries(api: &ApiClient, filter: &SalaryFilter) -> Result<Listing<SalaryRecord>, ApiError> {
    let mut query = filter.list.to_query();
    if let Some(id) = filter.employee_id {
        query.push(("employeeId", id.to_string()));
    }
    if let Some(period) = &filter.period {
        validate_period(period)?;
        query.push(("period", period.clone()));
    }
    api.get(SALARIES_PATH, &query).await
}

pub async fn get_salary(api: &ApiClient, id: i64) -> Result<SalaryRecord, ApiError> {
    api.get(&format!("{SALARIES_PATH}/{id}"), &[]).await
}

/// Ask the backend to compute (or recompute) an employee's pay for a period.
pub async fn calculate_salary(
    api: &ApiClient,
    employee_id: i64,
    period: &str,
) -> Result<SalaryRecord, ApiError> {
    validate_period(period)?;
    api.post(
        &format!("{SALARIES_PATH}/calculate"),
        &serde_json::json!({ "employeeId": employee_id, "period": period }),
    )
    .await
}

pub async fn mark_salary_paid(api: &ApiClient, id: i64) -> Result<SalaryRecord, ApiError> {
    api.patch(&format!("{SALARIES_PATH}/{id}/paid"), &serde_json::json!({}))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::test_client;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn pay_period_is_zero_padded() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 31).expect("date");
        assert_eq!(pay_period(date), "2026-03");
        assert!(validate_period("2026-13").is_err());
        assert!(validate_period("2026-03").is_ok());
    }

    #[tokio::test]
    async fn calculate_surfaces_business_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/salaries/calculate"))
            .and(body_json(serde_json::json!({ "employeeId": 9, "period": "2026-02" })))
            .respond_with(
                ResponseTemplate::new(422)
                    .set_body_json(serde_json::json!({ "message": "No shifts recorded for period" })),
            )
            .mount(&server)
            .await;

        let api = test_client(&server, Some("tok"));
        let err = calculate_salary(&api, 9, "2026-02")
            .await
            .expect_err("rejected");
        assert_eq!(err.status(), Some(422));
        assert_eq!(err.to_string(), "No shifts recorded for period");
    }

    #[tokio::test]
    async fn list_filters_by_employee_and_period() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(SALARIES_PATH))
            .and(query_param("employeeId", "4"))
            .and(query_param("period", "2026-01"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "id": 1, "employeeId": 4, "period": "2026-01", "totalAmount": 1800.0 }
            ])))
            .mount(&server)
            .await;

        let api = test_client(&server, Some("tok"));
        let filter = SalaryFilter {
            employee_id: Some(4),
            period: Some("2026-01".into()),
            ..SalaryFilter::default()
        };
        let records = list_salaries(&api, &filter).await.expect("list");
        assert_eq!(records.items()[0].total_amount, 1800.0);
        assert!(!records.items()[0].paid);
    }
}
