//! Ingredient inventory endpoints.
//!
//! Stock is deducted server-side when orders are prepared; the client only
//! reads levels, edits ingredient records and posts restocks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::{ApiClient, ListParams, Listing};
use crate::error::ApiError;

const INVENTORY_PATH: &str = "/api/inventory";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ingredient {
    pub id: i64,
    pub name: String,
    pub unit: String,
    pub quantity: f64,
    #[serde(default)]
    pub min_quantity: f64,
    #[serde(default)]
    pub unit_cost: Option<f64>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Ingredient {
    pub fn is_low_stock(&self) -> bool {
        self.quantity <= self.min_quantity
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngredientDraft {
    pub name: String,
    pub unit: String,
    pub quantity: f64,
    pub min_quantity: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_cost: Option<f64>,
}

impl IngredientDraft {
    fn validate(&self) -> Result<(), ApiError> {
        if self.name.trim().is_empty() || self.unit.trim().is_empty() {
            return Err(ApiError::InvalidRequest(
                "Ingredient name and unit are required".into(),
            ));
        }
        if self.quantity < 0.0 || self.min_quantity < 0.0 {
            return Err(ApiError::InvalidRequest("Quantities cannot be negative".into()));
        }
        Ok(())
    }
}

pub async fn list_ingredients(
    api: &ApiClient,
    params: &ListParams,
) -> Result<Listing<Ingredient>, ApiError> {
    api.get(INVENTORY_PATH, &params.to_query()).await
}

pub async fn get_ingredient(api: &ApiClient, id: i64) -> Result<Ingredient, ApiError> {
    api.get(&format!("{INVENTORY_PATH}/{id}"), &[]).await
}

pub async fn create_ingredient(api: &ApiClient, draft: &IngredientDraft) -> Result<Ingredient, ApiError> {
    draft.validate()?;
    api.post(INVENTORY_PATH, draft).await
}

pub async fn update_ingredient(
    api: &ApiClient,
    id: i64,
    draft: &IngredientDraft,
) -> Result<Ingredient, ApiError> {
    draft.validate()?;
    api.put(&format!("{INVENTORY_PATH}/{id}"), draft).await
}

pub async fn delete_ingredient(api: &ApiClient, id: i64) -> Result<(), ApiError> {
    api.delete(&format!("{INVENTORY_PATH}/{id}")).await
}

/// Add `quantity` units of stock.
pub async fn restock(api: &ApiClient, id: i64, quantity: f64) -> Result<Ingredient, ApiError> {
    if quantity.is_nan() || quantity <= 0.0 {
        return Err(ApiError::InvalidRequest("Restock quantity must be positive".into()));
    }
    api.post(
        &format!("{INVENTORY_PATH}/{id}/restock"),
        &serde_json::json!({ "quantity": quantity }),
    )
    .await
}

/// Ingredients at or below their minimum level.
pub async fn low_stock(api: &ApiClient) -> Result<Vec<Ingredient>, ApiError> {
    let listing: Listing<Ingredient> = api.get(&format!("{INVENTORY_PATH}/low-stock"), &[]).await?;
    Ok(listing.into_items())
}
