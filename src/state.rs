use crate::api::{ApiClient, AuthApi, ConversationApi};
use crate::auth::{AuthStore, Identity};
use crate::cache::LocalCache;
use crate::config::Config;
use crate::credentials::Credentials;
use crate::history::HistoryStore;
use crate::routes::Route;
use crate::session::SessionStore;
use crate::storage::{KeyValueStore, SqliteStore};
use anyhow::Context;
use std::sync::Arc;
use tokio::sync::Mutex;

// Everything the command handlers share. One instance per client.
pub struct AppState {
    pub api: Arc<ApiClient>,
    pub credentials: Arc<Credentials>,
    pub session: Mutex<SessionStore>,
    pub history: Mutex<HistoryStore>,
    pub auth: Mutex<AuthStore>,
    pub route: Mutex<Route>,
}

impl AppState {
    /// Opens the on-disk cache named by `config` and restores the previous identity.
    pub async fn initialize(config: &Config) -> anyhow::Result<Self> {
        let store = SqliteStore::open(&config.cache_path)
            .await
            .with_context(|| format!("Failed to open cache at {}", config.cache_path.display()))?;
        log::info!("Using cache at {}", config.cache_path.display());
        Self::with_store(config, Arc::new(store)).await
    }

    /// Builds the state over an arbitrary key/value backend.
    pub async fn with_store(config: &Config, store: Arc<dyn KeyValueStore>) -> anyhow::Result<Self> {
        let cache = LocalCache::new(store);
        let credentials = Arc::new(Credentials::new(cache.clone()));
        let api = Arc::new(
            ApiClient::new(&config.api_base_url, config.request_timeout, credentials.clone())
                .context("Failed to create API client")?,
        );

        let auth_api: Arc<dyn AuthApi> = api.clone();
        let conversation_api: Arc<dyn ConversationApi> = api.clone();
        let mut auth = AuthStore::new(auth_api, credentials.clone());
        let mut history = HistoryStore::new(cache, conversation_api);

        auth.initialize().await;
        history.load(auth.identity()).await;

        Ok(Self {
            api,
            credentials,
            session: Mutex::new(SessionStore::new()),
            history: Mutex::new(history),
            auth: Mutex::new(auth),
            route: Mutex::new(Route::Home),
        })
    }

    pub async fn identity(&self) -> Identity {
        self.auth.lock().await.identity()
    }

    pub async fn navigate(&self, route: Route) {
        log::debug!("Navigating to {}", route);
        *self.route.lock().await = route;
    }

    pub async fn current_route(&self) -> Route {
        self.route.lock().await.clone()
    }
}
