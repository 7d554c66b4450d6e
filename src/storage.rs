//! Persisted client state.
//!
//! Three string keys survive restarts: the auth token, the serialized user
//! profile and the theme preference. The production backend is the OS
//! credential store (Keychain, DPAPI, Secret Service via `keyring`); tests
//! and headless tools use [`MemoryStorage`].

use std::collections::HashMap;
use std::sync::Mutex;

use keyring::Entry;
use tracing::warn;

const SERVICE_NAME: &str = "coffee-desk";

pub const KEY_AUTH_TOKEN: &str = "auth_token";
pub const KEY_USER_PROFILE: &str = "user_profile";
pub const KEY_THEME: &str = "theme";

/// Key/value persistence used by the session and preferences services.
pub trait Storage: Send + Sync {
    /// Returns `None` when the key does not exist or cannot be read.
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), String>;
    /// Silently succeeds if the key does not exist.
    fn remove(&self, key: &str) -> Result<(), String>;
}

// ---------------------------------------------------------------------------
// OS keyring
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct KeyringStorage {
    service: String,
}

impl KeyringStorage {
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    pub fn with_service(service: &str) -> Self {
        Self {
            service: service.to_string(),
        }
    }
}

impl Default for KeyringStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for KeyringStorage {
    fn get(&self, key: &str) -> Option<String> {
        let entry = match Entry::new(&self.service, key) {
            Ok(e) => e,
            Err(e) => {
                warn!(key, error = %e, "keyring: failed to create entry");
                return None;
            }
        };
        match entry.get_password() {
            Ok(pw) => Some(pw),
            Err(keyring::Error::NoEntry) => None,
            Err(e) => {
                warn!(key, error = %e, "keyring: failed to read value");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), String> {
        let entry = Entry::new(&self.service, key).map_err(|e| e.to_string())?;
        entry.set_password(value).map_err(|e| e.to_string())
    }

    fn remove(&self, key: &str) -> Result<(), String> {
        let entry = Entry::new(&self.service, key).map_err(|e| e.to_string())?;
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), String> {
        self.values
            .lock()
            .map_err(|e| e.to_string())?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), String> {
        self.values.lock().map_err(|e| e.to_string())?.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_storage_round_trip_and_remove_missing() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.get(KEY_THEME), None);

        storage.set(KEY_THEME, "dark").expect("set theme");
        assert_eq!(storage.get(KEY_THEME).as_deref(), Some("dark"));

        storage.remove(KEY_THEME).expect("remove theme");
        storage.remove(KEY_THEME).expect("removing twice is fine");
        assert_eq!(storage.get(KEY_THEME), None);
    }
}
