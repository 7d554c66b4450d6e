//! REST transport for the coffee-shop backend.
//!
//! Every call is a JSON request/response against the configured base URL.
//! Authenticated calls carry `Authorization: Bearer <token>` from the
//! [`SessionService`]. A 401 on an authenticated call is handled once, here:
//! the stored credentials are wiped and [`AuthEvent::LoginRequired`] is
//! broadcast so the shell can return to its login screen.

use std::sync::Arc;

use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::{friendly_error, status_message, ApiError};
use crate::session::SessionService;

/// Query-string pairs appended to a request URL.
pub type QueryPairs = Vec<(&'static str, String)>;

/// Session-level events raised by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// Credentials were rejected and have been cleared.
    LoginRequired,
}

#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    session: Arc<SessionService>,
    auth_events: broadcast::Sender<AuthEvent>,
}

impl ApiClient {
    pub fn new(config: &ClientConfig, session: Arc<SessionService>) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ApiError::InvalidRequest(format!("Failed to create HTTP client: {e}")))?;
        let (auth_events, _) = broadcast::channel(16);
        Ok(Self {
            http,
            base_url: config.api_base_url.clone(),
            session,
            auth_events,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &Arc<SessionService> {
        &self.session
    }

    /// Subscribe to transport-level auth events.
    pub fn auth_events(&self) -> broadcast::Receiver<AuthEvent> {
        self.auth_events.subscribe()
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&'static str, String)],
    ) -> Result<T, ApiError> {
        let value = self.send(Method::GET, path, query, None).await?;
        decode(value)
    }

    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let value = self
            .send(Method::POST, path, &[], Some(encode(body)?))
            .await?;
        decode(value)
    }

    pub async fn put<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let value = self
            .send(Method::PUT, path, &[], Some(encode(body)?))
            .await?;
        decode(value)
    }

    pub async fn patch<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let value = self
            .send(Method::PATCH, path, &[], Some(encode(body)?))
            .await?;
        decode(value)
    }

    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.send(Method::DELETE, path, &[], None).await?;
        Ok(())
    }

    /// Perform a request and return the raw JSON body (`Value::Null` for an
    /// empty or 204 response).
    ///
    /// `path` should include the leading slash, e.g. `/api/orders`.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&'static str, String)],
        body: Option<Value>,
    ) -> Result<Value, ApiError> {
        if !path.starts_with('/') {
            return Err(ApiError::InvalidRequest(format!(
                "API path must start with '/': {path}"
            )));
        }
        let full_url = format!("{}{path}", self.base_url);

        let mut req = self
            .http
            .request(method.clone(), &full_url)
            .header("Accept", "application/json");
        if !query.is_empty() {
            req = req.query(query);
        }

        let token = self.session.token();
        if let Some(token) = token.as_deref() {
            req = req.bearer_auth(token);
        }
        if let Some(b) = body {
            req = req.json(&b);
        }

        debug!(method = %method, path, "api request");
        let resp = req
            .send()
            .await
            .map_err(|e| friendly_error(&self.base_url, &e))?;
        let status = resp.status();
        let body_text = resp.text().await.unwrap_or_default();

        if status == StatusCode::UNAUTHORIZED && token.is_some() {
            warn!(path, "authentication rejected, clearing session");
            self.session.clear();
            // No receivers is fine: nobody is showing a login screen yet.
            let _ = self.auth_events.send(AuthEvent::LoginRequired);
            return Err(ApiError::Unauthorized);
        }

        if !status.is_success() {
            let message = error_detail(status, &body_text);
            debug!(status = status.as_u16(), path, %message, "api request failed");
            return Err(ApiError::Http {
                status: status.as_u16(),
                message,
            });
        }

        if body_text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body_text).map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }
}

/// Pull the human-readable reason out of an error payload.
fn error_detail(status: StatusCode, body_text: &str) -> String {
    if let Ok(json) = serde_json::from_str::<Value>(body_text) {
        if let Some(message) = json
            .get("message")
            .or_else(|| json.get("error"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            return message.to_string();
        }
    } else if !body_text.trim().is_empty() && body_text.trim().len() <= 200 {
        return body_text.trim().to_string();
    }
    status_message(status)
}

fn encode<B: Serialize + ?Sized>(body: &B) -> Result<Value, ApiError> {
    serde_json::to_value(body).map_err(|e| ApiError::InvalidRequest(e.to_string()))
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, ApiError> {
    serde_json::from_value(value).map_err(|e| ApiError::InvalidResponse(e.to_string()))
}

// ---------------------------------------------------------------------------
// Listings
// ---------------------------------------------------------------------------

/// A Spring-style page envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub content: Vec<T>,
    #[serde(default)]
    pub total_elements: u64,
    #[serde(default)]
    pub total_pages: u32,
    #[serde(default)]
    pub number: u32,
    #[serde(default)]
    pub size: u32,
}

/// Result of a list endpoint. Some endpoints page, some return a bare
/// array; the shape is decided here once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Listing<T> {
    Page(Page<T>),
    Items(Vec<T>),
}

impl<T> Listing<T> {
    pub fn items(&self) -> &[T] {
        match self {
            Self::Page(page) => &page.content,
            Self::Items(items) => items,
        }
    }

    pub fn into_items(self) -> Vec<T> {
        match self {
            Self::Page(page) => page.content,
            Self::Items(items) => items,
        }
    }

    pub fn total(&self) -> u64 {
        match self {
            Self::Page(page) => page.total_elements,
            Self::Items(items) => items.len() as u64,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }
}

impl<T> Default for Listing<T> {
    fn default() -> Self {
        Self::Items(Vec::new())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Paging, sorting and free-text search shared by list endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListParams {
    pub page: Option<u32>,
    pub size: Option<u32>,
    pub sort: Option<(String, SortDirection)>,
    pub search: Option<String>,
}

impl ListParams {
    pub fn page(page: u32, size: u32) -> Self {
        Self {
            page: Some(page),
            size: Some(size),
            ..Self::default()
        }
    }

    pub fn sorted_by(mut self, field: &str, direction: SortDirection) -> Self {
        self.sort = Some((field.to_string(), direction));
        self
    }

    pub fn search(mut self, term: &str) -> Self {
        let term = term.trim();
        self.search = (!term.is_empty()).then(|| term.to_string());
        self
    }

    pub fn to_query(&self) -> QueryPairs {
        let mut pairs = QueryPairs::new();
        if let Some(page) = self.page {
            pairs.push(("page", page.to_string()));
        }
        if let Some(size) = self.size {
            pairs.push(("size", size.to_string()));
        }
        if let Some((field, direction)) = &self.sort {
            let dir = match direction {
                SortDirection::Asc => "asc",
                SortDirection::Desc => "desc",
            };
            pairs.push(("sort", format!("{field},{dir}")));
        }
        if let Some(search) = &self.search {
            pairs.push(("search", search.clone()));
        }
        pairs
    }
}
