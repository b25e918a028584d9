//! Authenticated identity and bearer credential lifecycle.

use crate::api::AuthApi;
use crate::credentials::Credentials;
use crate::error::ApiError;
use crate::models::{AccessToken, HistoryEntry, MigrationSummary, UserProfile};
use std::sync::Arc;

/// Which history source the current identity reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identity {
    Anonymous,
    Authenticated,
}

/// Point-in-time view of the auth store.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthIdentity {
    pub user: Option<UserProfile>,
    pub token: Option<String>,
    pub is_authenticated: bool,
    pub is_loading: bool,
    pub error: Option<String>,
}

pub struct AuthStore {
    api: Arc<dyn AuthApi>,
    credentials: Arc<Credentials>,
    user: Option<UserProfile>,
    // Set once the token has been accepted by the profile endpoint
    verified: bool,
    is_loading: bool,
    error: Option<String>,
}

impl AuthStore {
    pub fn new(api: Arc<dyn AuthApi>, credentials: Arc<Credentials>) -> Self {
        Self {
            api,
            credentials,
            user: None,
            verified: false,
            is_loading: false,
            error: None,
        }
    }

    /// Restores a persisted token and validates it; an invalid one is discarded.
    pub async fn initialize(&mut self) {
        if self.credentials.load().await.is_none() {
            return;
        }
        if let Err(e) = self.fetch_current_user().await {
            log::warn!("Stored token rejected, logging out: {}", e);
            self.logout().await;
        }
    }

    pub async fn register(&mut self, email: &str, password: &str) -> Result<(), ApiError> {
        self.is_loading = true;
        self.error = None;

        let api = self.api.clone();
        let result = match api.register(email, password).await {
            Ok(token) => self.accept(token).await,
            Err(e) => Err(e),
        };

        self.is_loading = false;
        if let Err(e) = &result {
            self.error = Some(e.detail().unwrap_or("Registration failed").to_string());
        }
        result
    }

    pub async fn login(&mut self, email: &str, password: &str) -> Result<(), ApiError> {
        self.is_loading = true;
        self.error = None;

        let api = self.api.clone();
        let result = match api.login(email, password).await {
            Ok(token) => self.accept(token).await,
            Err(e) => Err(e),
        };

        self.is_loading = false;
        if let Err(e) = &result {
            self.error = Some(e.detail().unwrap_or("Login failed").to_string());
        }
        result
    }

    async fn accept(&mut self, token: AccessToken) -> Result<(), ApiError> {
        // A new token is unverified until its profile loads
        self.user = None;
        self.verified = false;
        self.credentials.store(&token.access_token).await;
        self.fetch_current_user().await?;
        log::info!("Signed in as {}", self.user_email().unwrap_or("<unknown>"));
        Ok(())
    }

    pub async fn logout(&mut self) {
        self.user = None;
        self.verified = false;
        self.credentials.clear().await;
    }

    pub async fn fetch_current_user(&mut self) -> Result<(), ApiError> {
        match self.api.get_current_user().await {
            Ok(user) => {
                self.user = Some(user);
                self.verified = true;
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to fetch user: {}", e);
                self.user = None;
                self.verified = false;
                Err(e)
            }
        }
    }

    /// Uploads anonymous history to the signed-in account.
    pub async fn migrate_local_data(
        &self,
        entries: &[HistoryEntry],
    ) -> Result<MigrationSummary, ApiError> {
        match self.api.migrate_data(entries).await {
            Ok(summary) => {
                log::info!("Migrated {} conversations", summary.migrated_count);
                Ok(summary)
            }
            Err(e) => {
                log::error!("Migration failed: {}", e);
                Err(e)
            }
        }
    }

    /// True only while a validated token is still held; a 401 anywhere clears it.
    pub fn is_authenticated(&self) -> bool {
        self.verified && self.credentials.is_present()
    }

    pub fn identity(&self) -> Identity {
        if self.is_authenticated() {
            Identity::Authenticated
        } else {
            Identity::Anonymous
        }
    }

    pub fn user(&self) -> Option<&UserProfile> {
        self.user.as_ref().filter(|_| self.is_authenticated())
    }

    pub fn user_email(&self) -> Option<&str> {
        self.user().map(|user| user.email.as_str())
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn snapshot(&self) -> AuthIdentity {
        AuthIdentity {
            user: self.user().cloned(),
            token: self.credentials.current(),
            is_authenticated: self.is_authenticated(),
            is_loading: self.is_loading,
            error: self.error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockAuthApi;
    use crate::cache::LocalCache;
    use crate::constants::TOKEN_KEY;
    use crate::storage::MemoryStore;

    fn profile() -> UserProfile {
        UserProfile {
            id: "u-1".to_string(),
            email: "learner@example.com".to_string(),
            created_at: None,
        }
    }

    fn token(value: &str) -> AccessToken {
        AccessToken {
            access_token: value.to_string(),
            token_type: Some("bearer".to_string()),
        }
    }

    fn server_error(status: u16, detail: Option<&str>) -> ApiError {
        ApiError::Server {
            status,
            detail: detail.map(str::to_string),
            message: "fallback".to_string(),
        }
    }

    fn store_with(api: MockAuthApi) -> (AuthStore, Arc<Credentials>, LocalCache) {
        let cache = LocalCache::new(Arc::new(MemoryStore::new()));
        let credentials = Arc::new(Credentials::new(cache.clone()));
        (
            AuthStore::new(Arc::new(api), credentials.clone()),
            credentials,
            cache,
        )
    }

    #[tokio::test]
    async fn login_persists_token_and_loads_profile() {
        let mut api = MockAuthApi::new();
        api.expect_login()
            .withf(|email, password| {
                email.to_string() == "learner@example.com" && password.to_string() == "secret"
            })
            .times(1)
            .returning(|_, _| Ok(token("tok-1")));
        api.expect_get_current_user()
            .times(1)
            .returning(|| Ok(profile()));

        let (mut auth, _credentials, cache) = store_with(api);
        auth.login("learner@example.com", "secret").await.unwrap();

        assert!(auth.is_authenticated());
        assert_eq!(auth.identity(), Identity::Authenticated);
        assert_eq!(auth.user_email(), Some("learner@example.com"));
        assert!(!auth.is_loading());
        assert_eq!(auth.error(), None);
        assert_eq!(cache.get_raw(TOKEN_KEY).await.as_deref(), Some("tok-1"));
    }

    #[tokio::test]
    async fn login_failure_records_server_detail() {
        let mut api = MockAuthApi::new();
        api.expect_login()
            .returning(|_, _| Err(server_error(401, Some("Incorrect email or password"))));

        let (mut auth, _, _) = store_with(api);
        let err = auth.login("a@b.c", "wrong").await.unwrap_err();

        assert!(err.is_unauthorized());
        assert_eq!(auth.error(), Some("Incorrect email or password"));
        assert!(!auth.is_loading());
        assert!(!auth.is_authenticated());
    }

    #[tokio::test]
    async fn register_failure_without_detail_uses_generic_message() {
        let mut api = MockAuthApi::new();
        api.expect_register()
            .returning(|_, _| Err(server_error(500, None)));

        let (mut auth, _, _) = store_with(api);
        assert!(auth.register("a@b.c", "pw").await.is_err());
        assert_eq!(auth.error(), Some("Registration failed"));
    }

    #[tokio::test]
    async fn register_then_profile_failure_is_reported() {
        let mut api = MockAuthApi::new();
        api.expect_register().returning(|_, _| Ok(token("tok")));
        api.expect_get_current_user()
            .returning(|| Err(server_error(500, Some("db down"))));

        let (mut auth, _, _) = store_with(api);
        assert!(auth.register("a@b.c", "pw").await.is_err());
        assert_eq!(auth.error(), Some("db down"));
        assert!(!auth.is_authenticated());
    }

    #[tokio::test]
    async fn initialize_without_token_skips_network() {
        let api = MockAuthApi::new();
        let (mut auth, _, _) = store_with(api);
        auth.initialize().await;
        assert_eq!(auth.identity(), Identity::Anonymous);
    }

    #[tokio::test]
    async fn initialize_discards_invalid_token() {
        let mut api = MockAuthApi::new();
        api.expect_get_current_user()
            .times(1)
            .returning(|| Err(server_error(401, Some("Could not validate credentials"))));

        let (mut auth, credentials, cache) = store_with(api);
        cache.set_raw(TOKEN_KEY, "expired").await;

        auth.initialize().await;
        assert!(!auth.is_authenticated());
        assert_eq!(credentials.current(), None);
        assert_eq!(cache.get_raw(TOKEN_KEY).await, None);
    }

    #[tokio::test]
    async fn initialize_restores_valid_token() {
        let mut api = MockAuthApi::new();
        api.expect_get_current_user().returning(|| Ok(profile()));

        let (mut auth, _, cache) = store_with(api);
        cache.set_raw(TOKEN_KEY, "still-good").await;

        auth.initialize().await;
        let snapshot = auth.snapshot();
        assert!(snapshot.is_authenticated);
        assert_eq!(snapshot.token.as_deref(), Some("still-good"));
        assert_eq!(snapshot.user, Some(profile()));
    }

    #[tokio::test]
    async fn cleared_credential_revokes_authentication() {
        let mut api = MockAuthApi::new();
        api.expect_login().returning(|_, _| Ok(token("tok")));
        api.expect_get_current_user().returning(|| Ok(profile()));

        let (mut auth, credentials, _) = store_with(api);
        auth.login("a@b.c", "pw").await.unwrap();

        // What the API client does on any 401
        credentials.clear().await;
        assert!(!auth.is_authenticated());
        assert_eq!(auth.user(), None);
        assert_eq!(auth.identity(), Identity::Anonymous);
    }

    #[tokio::test]
    async fn logout_clears_everything() {
        let mut api = MockAuthApi::new();
        api.expect_login().returning(|_, _| Ok(token("tok")));
        api.expect_get_current_user().returning(|| Ok(profile()));

        let (mut auth, _, cache) = store_with(api);
        auth.login("a@b.c", "pw").await.unwrap();
        auth.logout().await;

        let snapshot = auth.snapshot();
        assert_eq!(snapshot.user, None);
        assert_eq!(snapshot.token, None);
        assert!(!snapshot.is_authenticated);
        assert_eq!(cache.get_raw(TOKEN_KEY).await, None);
    }

    #[tokio::test]
    async fn migration_errors_propagate() {
        let mut api = MockAuthApi::new();
        api.expect_migrate_data()
            .withf(|entries| entries.is_empty())
            .returning(|_| Err(server_error(500, None)));

        let (auth, _, _) = store_with(api);
        assert!(auth.migrate_local_data(&[]).await.is_err());
    }

    #[tokio::test]
    async fn failed_relogin_does_not_revive_previous_identity() {
        let mut api = MockAuthApi::new();
        api.expect_login().times(2).returning(|_, _| Ok(token("tok")));
        let mut profile_calls = 0;
        api.expect_get_current_user().times(2).returning(move || {
            profile_calls += 1;
            if profile_calls == 1 {
                Ok(profile())
            } else {
                Err(server_error(500, None))
            }
        });

        let (mut auth, credentials, _) = store_with(api);
        auth.login("learner@example.com", "secret").await.unwrap();
        credentials.clear().await;

        assert!(auth.login("learner@example.com", "secret").await.is_err());
        // The new token is held but was never validated
        assert_eq!(credentials.current().as_deref(), Some("tok"));
        assert!(!auth.is_authenticated());
        assert_eq!(auth.identity(), Identity::Anonymous);
        assert_eq!(auth.user_email(), None);
        assert_eq!(auth.snapshot().user, None);
    }

    #[tokio::test]
    async fn failed_profile_refresh_revokes_authentication() {
        let mut api = MockAuthApi::new();
        api.expect_login().returning(|_, _| Ok(token("tok")));
        let mut profile_calls = 0;
        api.expect_get_current_user().times(2).returning(move || {
            profile_calls += 1;
            if profile_calls == 1 {
                Ok(profile())
            } else {
                Err(server_error(503, None))
            }
        });

        let (mut auth, _, _) = store_with(api);
        auth.login("learner@example.com", "secret").await.unwrap();
        assert!(auth.fetch_current_user().await.is_err());
        assert!(!auth.is_authenticated());
        assert_eq!(auth.user(), None);
    }
}
