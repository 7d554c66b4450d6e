//! Client configuration.
//!
//! The API base URL is the only externally supplied value; everything else
//! has a compiled-in default that can be overridden through the environment.

use std::time::Duration;

use crate::session::Role;

/// Environment variable holding the REST backend base URL.
pub const ENV_API_URL: &str = "COFFEE_DESK_API_URL";
/// Optional override for the order polling interval (milliseconds).
pub const ENV_POLL_INTERVAL_MS: &str = "COFFEE_DESK_POLL_INTERVAL_MS";
/// Optional override for the per-request timeout (seconds).
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "COFFEE_DESK_REQUEST_TIMEOUT_SECS";

/// Default timeout for API requests (30 seconds).
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default order polling interval (5 seconds).
pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_millis(5_000);

/// Roles that receive new-order notifications from the kitchen poller.
pub const DEFAULT_NOTIFICATION_ROLES: &[Role] = &[Role::Admin, Role::Manager, Role::Barista];

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub request_timeout: Duration,
    pub polling_interval: Duration,
    pub notification_roles: Vec<Role>,
}

impl ClientConfig {
    pub fn new(api_base_url: &str) -> Self {
        Self {
            api_base_url: normalize_base_url(api_base_url),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            polling_interval: DEFAULT_POLLING_INTERVAL,
            notification_roles: DEFAULT_NOTIFICATION_ROLES.to_vec(),
        }
    }

    /// Build the configuration from the process environment.
    ///
    /// `COFFEE_DESK_API_URL` is required; malformed numeric overrides are
    /// rejected rather than silently ignored.
    pub fn from_env() -> Result<Self, String> {
        let base = std::env::var(ENV_API_URL)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| format!("Missing required environment variable {ENV_API_URL}"))?;

        let mut config = Self::new(&base);

        if let Ok(raw) = std::env::var(ENV_POLL_INTERVAL_MS) {
            let ms = raw
                .trim()
                .parse::<u64>()
                .map_err(|_| format!("Invalid {ENV_POLL_INTERVAL_MS}: {raw}"))?;
            if ms == 0 {
                return Err(format!("{ENV_POLL_INTERVAL_MS} must be greater than zero"));
            }
            config.polling_interval = Duration::from_millis(ms);
        }

        if let Ok(raw) = std::env::var(ENV_REQUEST_TIMEOUT_SECS) {
            let secs = raw
                .trim()
                .parse::<u64>()
                .map_err(|_| format!("Invalid {ENV_REQUEST_TIMEOUT_SECS}: {raw}"))?;
            config.request_timeout = Duration::from_secs(secs.max(1));
        }

        Ok(config)
    }

    pub fn with_polling_interval(mut self, interval: Duration) -> Self {
        self.polling_interval = interval;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Normalise the API base URL:
/// - ensure a scheme is present (https, or http for localhost)
/// - strip trailing slashes
/// - strip a trailing `/api` segment (endpoint paths carry it)
pub fn normalize_base_url(url: &str) -> String {
    let mut url = url.trim().to_string();

    if !url.starts_with("http://") && !url.starts_with("https://") {
        if url.starts_with("localhost") || url.starts_with("127.0.0.1") {
            url = format!("http://{url}");
        } else {
            url = format!("https://{url}");
        }
    }

    while url.ends_with('/') {
        url.pop();
    }

    if url.ends_with("/api") {
        url.truncate(url.len() - 4);
    }

    while url.ends_with('/') {
        url.pop();
    }

    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn normalize_adds_scheme_and_strips_api_suffix() {
        assert_eq!(
            normalize_base_url("localhost:8080/api/"),
            "http://localhost:8080"
        );
        assert_eq!(
            normalize_base_url(" coffee.example.com/ "),
            "https://coffee.example.com"
        );
        assert_eq!(
            normalize_base_url("https://coffee.example.com/api"),
            "https://coffee.example.com"
        );
    }

    #[test]
    #[serial]
    fn from_env_requires_base_url() {
        std::env::remove_var(ENV_API_URL);
        let err = ClientConfig::from_env().expect_err("missing url must fail");
        assert!(err.contains(ENV_API_URL));
    }

    #[test]
    #[serial]
    fn from_env_reads_overrides() {
        std::env::set_var(ENV_API_URL, "http://127.0.0.1:9000/");
        std::env::set_var(ENV_POLL_INTERVAL_MS, "2500");
        std::env::remove_var(ENV_REQUEST_TIMEOUT_SECS);

        let config = ClientConfig::from_env().expect("config from env");
        assert_eq!(config.api_base_url, "http://127.0.0.1:9000");
        assert_eq!(config.polling_interval, Duration::from_millis(2500));
        assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);

        std::env::set_var(ENV_POLL_INTERVAL_MS, "0");
        assert!(ClientConfig::from_env().is_err());

        std::env::remove_var(ENV_API_URL);
        std::env::remove_var(ENV_POLL_INTERVAL_MS);
    }
}
