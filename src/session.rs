//! Authenticated session and user preferences.
//!
//! Both services are explicit objects handed around by `Arc`; nothing here
//! is a process-wide singleton. Each has the same lifecycle: `init` reads
//! persisted values, setters write through to [`Storage`], `clear` wipes.

use std::fmt;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::storage::{Storage, KEY_AUTH_TOKEN, KEY_THEME, KEY_USER_PROFILE};

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

/// A staff role. Backend spellings (`ROLE_ADMIN`, `admin`, ` Manager `) are
/// normalized on the way in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    Admin,
    Manager,
    Barista,
    Cashier,
    Other(String),
}

impl Role {
    pub fn parse(raw: &str) -> Self {
        let upper = raw.trim().to_ascii_uppercase();
        let name = upper.strip_prefix("ROLE_").unwrap_or(&upper);
        match name {
            "ADMIN" => Self::Admin,
            "MANAGER" => Self::Manager,
            "BARISTA" => Self::Barista,
            "CASHIER" => Self::Cashier,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Admin => "ADMIN",
            Self::Manager => "MANAGER",
            Self::Barista => "BARISTA",
            Self::Cashier => "CASHIER",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for Role {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<&str> for Role {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.as_str().to_string()
    }
}

/// Normalize a role list: parse each entry, drop blanks and duplicates while
/// keeping first-seen order.
pub fn normalize_roles<I, S>(raw: I) -> Vec<Role>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut roles: Vec<Role> = Vec::new();
    for entry in raw {
        if entry.as_ref().trim().is_empty() {
            continue;
        }
        let role = Role::parse(entry.as_ref());
        if !roles.contains(&role) {
            roles.push(role);
        }
    }
    roles
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub roles: Vec<Role>,
}

impl UserProfile {
    pub fn has_role(&self, role: &Role) -> bool {
        self.roles.contains(role)
    }

    /// The role used for gating UI features: the first normalized role.
    pub fn primary_role(&self) -> Option<&Role> {
        self.roles.first()
    }
}

#[derive(Default)]
struct SessionInner {
    token: Option<Zeroizing<String>>,
    user: Option<UserProfile>,
}

pub struct SessionService {
    storage: Arc<dyn Storage>,
    inner: Mutex<SessionInner>,
}

impl SessionService {
    /// Load the persisted token and profile. A profile that no longer
    /// deserializes is discarded.
    pub fn init(storage: Arc<dyn Storage>) -> Self {
        let token = storage
            .get(KEY_AUTH_TOKEN)
            .filter(|t| !t.trim().is_empty())
            .map(Zeroizing::new);
        // A profile without a token is a half-finished logout; ignore it.
        let user = token.as_ref().and_then(|_| {
            let raw = storage.get(KEY_USER_PROFILE)?;
            match serde_json::from_str::<UserProfile>(&raw) {
                Ok(profile) => Some(profile),
                Err(e) => {
                    warn!(error = %e, "stored user profile is unreadable, discarding");
                    None
                }
            }
        });
        let inner = SessionInner { token, user };

        Self {
            storage,
            inner: Mutex::new(inner),
        }
    }

    pub fn token(&self) -> Option<String> {
        self.lock().token.as_ref().map(|t| t.to_string())
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.lock().user.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.lock().token.is_some()
    }

    pub fn has_any_role(&self, roles: &[Role]) -> bool {
        self.lock()
            .user
            .as_ref()
            .map(|u| u.roles.iter().any(|r| roles.contains(r)))
            .unwrap_or(false)
    }

    /// Store a fresh login. Persisted first so a failed write leaves the
    /// in-memory session untouched.
    pub fn login(&self, token: &str, user: UserProfile) -> Result<(), String> {
        let profile_json = serde_json::to_string(&user).map_err(|e| e.to_string())?;
        self.storage.set(KEY_AUTH_TOKEN, token)?;
        self.storage.set(KEY_USER_PROFILE, &profile_json)?;

        let mut inner = self.lock();
        inner.token = Some(Zeroizing::new(token.to_string()));
        info!(user_id = user.id, username = %user.username, "session started");
        inner.user = Some(user);
        Ok(())
    }

    /// Drop token and profile from memory and storage. Theme is kept.
    pub fn clear(&self) {
        {
            let mut inner = self.lock();
            // Zeroizing wipes the token buffer on drop.
            inner.token = None;
            inner.user = None;
        }
        for key in [KEY_AUTH_TOKEN, KEY_USER_PROFILE] {
            if let Err(e) = self.storage.remove(key) {
                warn!(key, error = %e, "failed to remove stored credential");
            }
        }
        info!("session cleared");
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ---------------------------------------------------------------------------
// Preferences
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "light" => Some(Self::Light),
            "dark" => Some(Self::Dark),
            _ => None,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Self::Light => Self::Dark,
            Self::Dark => Self::Light,
        }
    }
}

pub struct PreferencesService {
    storage: Arc<dyn Storage>,
    theme: Mutex<Theme>,
}

impl PreferencesService {
    pub fn init(storage: Arc<dyn Storage>) -> Self {
        let theme = storage
            .get(KEY_THEME)
            .and_then(|raw| Theme::parse(&raw))
            .unwrap_or_default();
        Self {
            storage,
            theme: Mutex::new(theme),
        }
    }

    pub fn theme(&self) -> Theme {
        *self.theme.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_theme(&self, theme: Theme) -> Result<(), String> {
        self.storage.set(KEY_THEME, theme.as_str())?;
        *self.theme.lock().unwrap_or_else(|e| e.into_inner()) = theme;
        Ok(())
    }

    pub fn toggle_theme(&self) -> Result<Theme, String> {
        let next = self.theme().toggled();
        self.set_theme(next)?;
        Ok(next)
    }

    pub fn clear(&self) -> Result<(), String> {
        self.storage.remove(KEY_THEME)?;
        *self.theme.lock().unwrap_or_else(|e| e.into_inner()) = Theme::default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn barista() -> UserProfile {
        UserProfile {
            id: 7,
            username: "mia".into(),
            roles: vec![Role::Barista],
        }
    }

    #[test]
    fn roles_are_normalized() {
        assert_eq!(Role::parse("ROLE_ADMIN"), Role::Admin);
        assert_eq!(Role::parse(" barista "), Role::Barista);
        assert_eq!(Role::parse("role_cleaner"), Role::Other("CLEANER".into()));
        assert_eq!(
            normalize_roles(["ROLE_MANAGER", "", "manager", "cashier"]),
            vec![Role::Manager, Role::Cashier]
        );
    }

    #[test]
    fn roles_serialize_as_plain_strings() {
        let json = serde_json::to_string(&barista()).expect("serialize");
        assert!(json.contains("\"roles\":[\"BARISTA\"]"), "{json}");
        let back: UserProfile =
            serde_json::from_str(r#"{"id":1,"username":"a","roles":["ROLE_ADMIN"]}"#)
                .expect("deserialize");
        assert_eq!(back.roles, vec![Role::Admin]);
    }

    #[test]
    fn session_persists_and_restores() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let session = SessionService::init(storage.clone());
        assert!(!session.is_authenticated());

        session.login("tok-123", barista()).expect("login");
        assert!(session.has_any_role(&[Role::Admin, Role::Barista]));

        let restored = SessionService::init(storage);
        assert_eq!(restored.token().as_deref(), Some("tok-123"));
        assert_eq!(restored.user(), Some(barista()));
    }

    #[test]
    fn clear_wipes_credentials_but_keeps_theme() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let prefs = PreferencesService::init(storage.clone());
        prefs.set_theme(Theme::Dark).expect("set theme");

        let session = SessionService::init(storage.clone());
        session.login("tok", barista()).expect("login");
        session.clear();

        assert!(session.token().is_none());
        assert!(storage.get(KEY_AUTH_TOKEN).is_none());
        assert!(storage.get(KEY_USER_PROFILE).is_none());
        assert_eq!(PreferencesService::init(storage).theme(), Theme::Dark);
    }

    #[test]
    fn corrupt_profile_is_discarded() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        storage.set(KEY_AUTH_TOKEN, "tok").expect("seed token");
        storage.set(KEY_USER_PROFILE, "{not json").expect("seed profile");

        let session = SessionService::init(storage);
        assert!(session.is_authenticated());
        assert!(session.user().is_none());
    }

    #[test]
    fn theme_toggles_and_ignores_garbage() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        storage.set(KEY_THEME, "sepia").expect("seed");
        let prefs = PreferencesService::init(storage.clone());
        assert_eq!(prefs.theme(), Theme::Light);

        assert_eq!(prefs.toggle_theme().expect("toggle"), Theme::Dark);
        assert_eq!(storage.get(KEY_THEME).as_deref(), Some("dark"));
    }
}
