//! Order endpoints and the order model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::{ApiClient, ListParams, Listing, SortDirection};
use crate::error::ApiError;

const ORDERS_PATH: &str = "/api/orders";

pub type OrderId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Preparing,
    Ready,
    Completed,
    Cancelled,
    #[serde(other)]
    Unknown,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Preparing => "PREPARING",
            Self::Ready => "READY",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
            Self::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    #[serde(default)]
    pub id: Option<i64>,
    pub product_id: i64,
    #[serde(default)]
    pub product_name: Option<String>,
    pub quantity: u32,
    #[serde(default)]
    pub unit_price: Option<f64>,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    #[serde(default)]
    pub order_number: Option<String>,
    pub status: OrderStatus,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub table_number: Option<String>,
    #[serde(default)]
    pub items: Vec<OrderItem>,
    #[serde(default)]
    pub total_amount: Option<f64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_by: Option<String>,
}

impl Order {
    pub fn is_pending(&self) -> bool {
        self.status == OrderStatus::Pending
    }

    /// Label used in notifications: the order number when the backend
    /// assigned one, otherwise `#<id>`.
    pub fn display_label(&self) -> String {
        match self.order_number.as_deref().map(str::trim) {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => format!("#{}", self.id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrderItem {
    pub product_id: i64,
    pub quantity: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    pub items: Vec<NewOrderItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderFilter {
    pub list: ListParams,
    pub status: Option<OrderStatus>,
}

pub async fn list_orders(api: &ApiClient, filter: &OrderFilter) -> Result<Listing<Order>, ApiError> {
    let mut query = filter.list.to_query();
    if let Some(status) = filter.status {
        query.push(("status", status.as_str().to_string()));
    }
    api.get(ORDERS_PATH, &query).await
}

/// The first page of orders, newest first by creation time.
pub async fn recent_orders(api: &ApiClient, page_size: u32) -> Result<Vec<Order>, ApiError> {
    let filter = OrderFilter {
        list: ListParams::page(0, page_size).sorted_by("createdAt", SortDirection::Desc),
        status: None,
    };
    Ok(list_orders(api, &filter).await?.into_items())
}

pub async fn get_order(api: &ApiClient, id: OrderId) -> Result<Order, ApiError> {
    api.get(&format!("{ORDERS_PATH}/{id}"), &[]).await
}

pub async fn create_order(api: &ApiClient, order: &NewOrder) -> Result<Order, ApiError> {
    if order.items.is_empty() {
        return Err(ApiError::InvalidRequest("An order needs at least one item".into()));
    }
    if order.items.iter().any(|i| i.quantity == 0) {
        return Err(ApiError::InvalidRequest("Item quantity must be positive".into()));
    }
    api.post(ORDERS_PATH, order).await
}

/// Move an order through the kitchen workflow. Ingredient deduction and
/// transition rules are enforced by the backend.
pub async fn update_order_status(
    api: &ApiClient,
    id: OrderId,
    status: OrderStatus,
) -> Result<Order, ApiError> {
    if status == OrderStatus::Unknown {
        return Err(ApiError::InvalidRequest("Unknown order status".into()));
    }
    api.patch(
        &format!("{ORDERS_PATH}/{id}/status"),
        &serde_json::json!({ "status": status }),
    )
    .await
}

pub async fn cancel_order(api: &ApiClient, id: OrderId) -> Result<Order, ApiError> {
    update_order_status(api, id, OrderStatus::Cancelled).await
}

pub async fn delete_order(api: &ApiClient, id: OrderId) -> Result<(), ApiError> {
    api.delete(&format!("{ORDERS_PATH}/{id}")).await
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::api::tests::test_client;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub(crate) fn order(id: OrderId, status: OrderStatus) -> Order {
        Order {
            id,
            order_number: None,
            status,
            customer_name: None,
            table_number: None,
            items: Vec::new(),
            total_amount: None,
            created_at: None,
            created_by: None,
        }
    }

    #[test]
    fn unknown_statuses_do_not_break_decoding() {
        let order: Order =
            serde_json::from_str(r#"{"id":5,"status":"ON_HOLD","createdAt":"2026-01-02T08:00:00Z"}"#)
                .expect("decode");
        assert_eq!(order.status, OrderStatus::Unknown);
        assert_eq!(order.display_label(), "#5");
        assert!(order.created_at.is_some());
    }

    #[tokio::test]
    async fn recent_orders_requests_newest_first() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(ORDERS_PATH))
            .and(query_param("page", "0"))
            .and(query_param("size", "10"))
            .and(query_param("sort", "createdAt,desc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [
                    { "id": 43, "status": "PENDING", "orderNumber": "A-043" },
                    { "id": 42, "status": "READY" }
                ],
                "totalElements": 2
            })))
            .mount(&server)
            .await;

        let api = test_client(&server, Some("tok"));
        let orders = recent_orders(&api, 10).await.expect("orders");
        assert_eq!(orders.len(), 2);
        assert!(orders[0].is_pending());
        assert_eq!(orders[0].display_label(), "A-043");
    }

    #[tokio::test]
    async fn status_update_sends_wire_name() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/api/orders/7/status"))
            .and(body_json(serde_json::json!({ "status": "READY" })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "id": 7, "status": "READY" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let api = test_client(&server, Some("tok"));
        let updated = update_order_status(&api, 7, OrderStatus::Ready)
            .await
            .expect("update");
        assert_eq!(updated.status, OrderStatus::Ready);
    }

    #[tokio::test]
    async fn create_order_validates_locally() {
        let server = MockServer::start().await;
        let api = test_client(&server, Some("tok"));
        let empty = NewOrder {
            items: Vec::new(),
            customer_name: None,
            table_number: None,
            note: None,
        };
        assert!(matches!(
            create_order(&api, &empty).await,
            Err(ApiError::InvalidRequest(_))
        ));
    }
}
