//! Username/password authentication against the backend.
//!
//! A successful login stores the bearer token and the normalized user
//! profile in the [`SessionService`](crate::session::SessionService); logout
//! wipes both. Lockout, password policy and token issuance are server-side.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::api::ApiClient;
use crate::error::ApiError;
use crate::session::{normalize_roles, UserProfile};

const LOGIN_PATH: &str = "/api/auth/login";
const LOGOUT_PATH: &str = "/api/auth/logout";
const ME_PATH: &str = "/api/auth/me";

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

/// A role as the backend spells it: a bare string or a `{ "name": .. }` /
/// `{ "authority": .. }` object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawRole {
    Name(String),
    Named { name: String },
    Authority { authority: String },
}

impl RawRole {
    fn as_str(&self) -> &str {
        match self {
            Self::Name(s) => s,
            Self::Named { name } => name,
            Self::Authority { authority } => authority,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawUser {
    id: i64,
    username: String,
    #[serde(default)]
    roles: Vec<RawRole>,
    #[serde(default)]
    role: Option<String>,
}

impl RawUser {
    fn into_profile(self) -> UserProfile {
        let names = self
            .roles
            .iter()
            .map(|r| r.as_str().to_string())
            .chain(self.role)
            .collect::<Vec<_>>();
        UserProfile {
            id: self.id,
            username: self.username,
            roles: normalize_roles(names),
        }
    }
}

/// Login response: either `{ token, user: {..} }` or the user fields
/// flattened next to the token.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    #[serde(alias = "accessToken")]
    token: String,
    #[serde(default)]
    user: Option<RawUser>,
    #[serde(flatten)]
    inline_user: Option<RawUser>,
}

/// Sign in and start a session. Returns the stored profile.
pub async fn login(api: &ApiClient, username: &str, password: &str) -> Result<UserProfile, ApiError> {
    let username = username.trim();
    if username.is_empty() || password.is_empty() {
        return Err(ApiError::InvalidRequest(
            "Username and password are required".into(),
        ));
    }

    let resp: LoginResponse = api
        .post(LOGIN_PATH, &LoginRequest { username, password })
        .await?;
    if resp.token.trim().is_empty() {
        return Err(ApiError::InvalidResponse("login returned an empty token".into()));
    }
    let profile = resp
        .user
        .or(resp.inline_user)
        .map(RawUser::into_profile)
        .ok_or_else(|| ApiError::InvalidResponse("login response has no user".into()))?;

    api.session()
        .login(resp.token.trim(), profile.clone())
        .map_err(|e| ApiError::InvalidRequest(format!("Failed to store session: {e}")))?;
    info!(username = %profile.username, roles = ?profile.roles, "login successful");
    Ok(profile)
}

/// End the session. The local session is cleared even when the server call
/// fails; the server-side failure is only logged.
pub async fn logout(api: &ApiClient) {
    if api.session().is_authenticated() {
        if let Err(e) = api.post::<_, serde_json::Value>(LOGOUT_PATH, &serde_json::json!({})).await {
            warn!(error = %e, "server-side logout failed");
        }
    }
    api.session().clear();
}

/// Fetch the profile of the signed-in user.
pub async fn current_user(api: &ApiClient) -> Result<UserProfile, ApiError> {
    let raw: RawUser = api.get(ME_PATH, &[]).await?;
    Ok(raw.into_profile())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::test_client;
    use crate::session::Role;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn login_stores_token_and_normalized_roles() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .and(body_json(serde_json::json!({ "username": "mia", "password": "pw" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token": "jwt-1",
                "user": { "id": 4, "username": "mia", "roles": ["ROLE_BARISTA", { "name": "cashier" }] }
            })))
            .mount(&server)
            .await;

        let api = test_client(&server, None);
        let profile = login(&api, " mia ", "pw").await.expect("login");
        assert_eq!(profile.roles, vec![Role::Barista, Role::Cashier]);
        assert_eq!(api.session().token().as_deref(), Some("jwt-1"));
        assert_eq!(api.session().user(), Some(profile));
    }

    #[tokio::test]
    async fn login_accepts_flattened_user() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "accessToken": "jwt-2", "id": 1, "username": "boss", "role": "admin"
            })))
            .mount(&server)
            .await;

        let api = test_client(&server, None);
        let profile = login(&api, "boss", "pw").await.expect("login");
        assert_eq!(profile.roles, vec![Role::Admin]);
    }

    #[tokio::test]
    async fn login_requires_credentials() {
        let server = MockServer::start().await;
        let api = test_client(&server, None);
        let err = login(&api, "  ", "pw").await.expect_err("blank username");
        assert!(matches!(err, ApiError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn logout_clears_even_when_server_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOGOUT_PATH))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let api = test_client(&server, Some("tok"));
        logout(&api).await;
        assert!(!api.session().is_authenticated());
    }
}
