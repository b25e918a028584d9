use crate::cache::LocalCache;
use crate::constants::TOKEN_KEY;
use std::sync::{PoisonError, RwLock};

/// The bearer credential shared by the API client and the auth store.
///
/// Kept in memory for request signing and mirrored to the local cache so it
/// survives restarts.
pub struct Credentials {
    cache: LocalCache,
    token: RwLock<Option<String>>,
}

impl Credentials {
    pub fn new(cache: LocalCache) -> Self {
        Self {
            cache,
            token: RwLock::new(None),
        }
    }

    /// Reloads the persisted token into memory and returns it.
    pub async fn load(&self) -> Option<String> {
        let token = self.cache.get_raw(TOKEN_KEY).await;
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = token.clone();
        token
    }

    pub fn current(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_present(&self) -> bool {
        self.current().is_some()
    }

    pub async fn store(&self, token: &str) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token.to_string());
        if !self.cache.set_raw(TOKEN_KEY, token).await {
            log::warn!("Bearer token kept in memory only; local cache rejected it");
        }
    }

    pub async fn clear(&self) {
        self.token
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.cache.remove_item(TOKEN_KEY).await;
    }
}
