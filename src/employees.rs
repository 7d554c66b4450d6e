//! Employee CRUD endpoints.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::api::{ApiClient, ListParams, Listing};
use crate::error::ApiError;

const EMPLOYEES_PATH: &str = "/api/employees";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Employee {
    pub id: i64,
    pub full_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub hourly_rate: Option<f64>,
    #[serde(default)]
    pub hire_date: Option<NaiveDate>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Create/update payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeDraft {
    pub full_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hourly_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hire_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}

impl EmployeeDraft {
    fn validate(&self) -> Result<(), ApiError> {
        if self.full_name.trim().is_empty() {
            return Err(ApiError::InvalidRequest("Employee name is required".into()));
        }
        if matches!(self.hourly_rate, Some(rate) if rate < 0.0) {
            return Err(ApiError::InvalidRequest("Hourly rate cannot be negative".into()));
        }
        Ok(())
    }
}

pub async fn list_employees(api: &ApiClient, params: &ListParams) -> Result<Listing<Employee>, ApiError> {
    api.get(EMPLOYEES_PATH, &params.to_query()).await
}

pub async fn get_employee(api: &ApiClient, id: i64) -> Result<Employee, ApiError> {
    api.get(&format!("{EMPLOYEES_PATH}/{id}"), &[]).await
}

pub async fn create_employee(api: &ApiClient, draft: &EmployeeDraft) -> Result<Employee, ApiError> {
    draft.validate()?;
    api.post(EMPLOYEES_PATH, draft).await
}

pub async fn update_employee(
    api: &ApiClient,
    id: i64,
    draft: &EmployeeDraft,
) -> Result<Employee, ApiError> {
    draft.validate()?;
    api.put(&format!("{EMPLOYEES_PATH}/{id}"), draft).await
}

pub async fn delete_employee(api: &ApiClient, id: i64) -> Result<(), ApiError> {
    api.delete(&format!("{EMPLOYEES_PATH}/{id}")).await
}
