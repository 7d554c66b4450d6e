//! Coffee Desk - client core for the coffee shop management backend.
//!
//! Screens (employees, inventory, orders, salaries, reports) sit on three
//! pieces provided here:
//! - a typed REST transport ([`api::ApiClient`]) with central 401 handling
//! - [`query::Query`] / [`mutation::Mutation`] state holders for reads and
//!   writes
//! - the kitchen [`poller::OrderPoller`] that raises new-order alerts
//!
//! [`CoffeeDesk`] wires the services together the way the desktop shell
//! uses them.

use std::sync::Arc;

use anyhow::Context as _;
use tracing::info;

pub mod api;
pub mod auth;
pub mod config;
pub mod employees;
pub mod error;
pub mod inventory;
pub mod logging;
pub mod mutation;
pub mod orders;
pub mod poller;
pub mod query;
pub mod reports;
pub mod salaries;
pub mod session;
pub mod storage;

pub use api::{ApiClient, AuthEvent, ListParams, Listing, Page, SortDirection};
pub use config::ClientConfig;
pub use error::ApiError;
pub use mutation::{Mutation, MutationState};
pub use poller::{CheckOutcome, OrderPoller, PollerPhase, PollerState};
pub use query::{Query, QueryOptions, QueryState, RefetchHandle};
pub use session::{PreferencesService, Role, SessionService, Theme, UserProfile};

/// Application services sharing one storage backend and one session.
pub struct CoffeeDesk {
    config: ClientConfig,
    session: Arc<SessionService>,
    preferences: Arc<PreferencesService>,
    api: ApiClient,
}

impl CoffeeDesk {
    pub fn new(config: ClientConfig, storage: Arc<dyn storage::Storage>) -> Result<Self, ApiError> {
        let session = Arc::new(SessionService::init(storage.clone()));
        let preferences = Arc::new(PreferencesService::init(storage));
        let api = ApiClient::new(&config, session.clone())?;
        info!(
            base_url = %config.api_base_url,
            authenticated = session.is_authenticated(),
            theme = preferences.theme().as_str(),
            "Coffee Desk v{} initialised",
            env!("CARGO_PKG_VERSION")
        );
        Ok(Self {
            config,
            session,
            preferences,
            api,
        })
    }

    /// Production bootstrap: configuration from the environment, persisted
    /// state in the OS credential store.
    pub fn from_env() -> anyhow::Result<Self> {
        let config = ClientConfig::from_env()
            .map_err(anyhow::Error::msg)
            .context("loading client configuration")?;
        let storage: Arc<dyn storage::Storage> = Arc::new(storage::KeyringStorage::new());
        Self::new(config, storage).context("building API client")
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn session(&self) -> &Arc<SessionService> {
        &self.session
    }

    pub fn preferences(&self) -> &Arc<PreferencesService> {
        &self.preferences
    }

    /// A poller reading from this client's backend, using the configured
    /// interval and notification roles. It starts idle; see
    /// [`CoffeeDesk::sync_poller`].
    pub fn order_poller<F>(&self, on_new_order: F) -> OrderPoller
    where
        F: Fn(&orders::Order) + Send + Sync + 'static,
    {
        let source: Arc<dyn poller::OrderSource> = Arc::new(self.api.clone());
        OrderPoller::builder(source)
            .interval(self.config.polling_interval)
            .allowed_roles(self.config.notification_roles.clone())
            .build(on_new_order)
    }

    /// Point the poller at the signed-in user's role. Signed out means idle.
    pub fn sync_poller(&self, poller: &OrderPoller, enabled: bool) {
        let role = self
            .session
            .user()
            .and_then(|u| u.primary_role().cloned());
        poller.configure(enabled, role);
    }
}
