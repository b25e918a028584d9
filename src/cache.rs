//! JSON view over a [`KeyValueStore`].
//!
//! The cache is best-effort: an unavailable backend or a corrupt value is
//! logged and reported as a miss, never as an error.

use crate::storage::KeyValueStore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

const PROBE_KEY: &str = "__local_cache_probe__";

#[derive(Clone)]
pub struct LocalCache {
    store: Arc<dyn KeyValueStore>,
}

impl LocalCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Writes and removes a probe key to check the backend accepts writes.
    pub async fn is_available(&self) -> bool {
        let probe = async {
            self.store.set(PROBE_KEY, PROBE_KEY).await?;
            self.store.remove(PROBE_KEY).await
        };
        match probe.await {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Local cache unavailable: {}", e);
                false
            }
        }
    }

    pub async fn get_item<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get_raw(key).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                log::error!("Error reading '{}' from local cache: {}", key, e);
                None
            }
        }
    }

    pub async fn set_item<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> bool {
        match serde_json::to_string(value) {
            Ok(json) => self.set_raw(key, &json).await,
            Err(e) => {
                log::error!("Error serializing '{}' for local cache: {}", key, e);
                false
            }
        }
    }

    /// Reads a value verbatim. Empty strings count as absent.
    pub async fn get_raw(&self, key: &str) -> Option<String> {
        if !self.is_available().await {
            return None;
        }
        match self.store.get(key).await {
            Ok(value) => value.filter(|v| !v.is_empty()),
            Err(e) => {
                log::error!("Error reading '{}' from local cache: {}", key, e);
                None
            }
        }
    }

    pub async fn set_raw(&self, key: &str, value: &str) -> bool {
        if !self.is_available().await {
            return false;
        }
        match self.store.set(key, value).await {
            Ok(()) => true,
            Err(e) => {
                log::error!("Error writing '{}' to local cache: {}", key, e);
                false
            }
        }
    }

    pub async fn remove_item(&self, key: &str) {
        if !self.is_available().await {
            return;
        }
        if let Err(e) = self.store.remove(key).await {
            log::error!("Error removing '{}' from local cache: {}", key, e);
        }
    }

    pub async fn clear(&self) {
        if !self.is_available().await {
            return;
        }
        if let Err(e) = self.store.clear().await {
            log::error!("Error clearing local cache: {}", e);
        }
    }
}
