//! Past conversations, kept in the local cache for anonymous use and on the
//! server once signed in.

use crate::api::ConversationApi;
use crate::auth::Identity;
use crate::cache::LocalCache;
use crate::constants::{HISTORY_KEY, MAX_HISTORY_ITEMS, REMOTE_HISTORY_LIMIT};
use crate::error::ApiError;
use crate::models::{iso_now, ConversationData, HistoryEntry, Report};
use async_trait::async_trait;
use std::sync::Arc;

/// Where history entries live for one kind of identity.
#[async_trait]
pub trait HistorySource: Send + Sync {
    async fn load(&self) -> Result<Vec<HistoryEntry>, ApiError>;

    /// Records a finished conversation into `entries`.
    async fn save(&self, entries: &mut Vec<HistoryEntry>, entry: HistoryEntry);

    async fn delete(&self, entries: &mut Vec<HistoryEntry>, id: &str) -> Result<(), ApiError>;

    async fn clear(&self, entries: &mut Vec<HistoryEntry>);

    async fn fetch(&self, id: &str) -> Result<Option<HistoryEntry>, ApiError>;
}

/// Capped list in the local cache, newest first.
#[derive(Clone)]
pub struct LocalHistory {
    cache: LocalCache,
}

impl LocalHistory {
    pub fn new(cache: LocalCache) -> Self {
        Self { cache }
    }

    async fn read(&self) -> Vec<HistoryEntry> {
        self.cache
            .get_item::<Vec<HistoryEntry>>(HISTORY_KEY)
            .await
            .unwrap_or_default()
    }

    async fn write(&self, entries: &[HistoryEntry]) {
        if !self.cache.set_item(HISTORY_KEY, entries).await {
            log::warn!("History kept in memory only; local cache rejected the write");
        }
    }
}

#[async_trait]
impl HistorySource for LocalHistory {
    async fn load(&self) -> Result<Vec<HistoryEntry>, ApiError> {
        Ok(self.read().await)
    }

    // Start from the cache; `entries` may still show another source's list
    async fn save(&self, entries: &mut Vec<HistoryEntry>, entry: HistoryEntry) {
        let mut cached = self.read().await;
        cached.insert(0, entry);
        cached.truncate(MAX_HISTORY_ITEMS);
        self.write(&cached).await;
        *entries = cached;
    }

    async fn delete(&self, entries: &mut Vec<HistoryEntry>, id: &str) -> Result<(), ApiError> {
        let mut cached = self.read().await;
        cached.retain(|entry| entry.id != id);
        self.write(&cached).await;
        *entries = cached;
        Ok(())
    }

    async fn clear(&self, entries: &mut Vec<HistoryEntry>) {
        entries.clear();
        self.cache.remove_item(HISTORY_KEY).await;
    }

    async fn fetch(&self, id: &str) -> Result<Option<HistoryEntry>, ApiError> {
        Ok(self.read().await.into_iter().find(|entry| entry.id == id))
    }
}

/// Conversations stored server-side for the signed-in user.
pub struct RemoteHistory {
    api: Arc<dyn ConversationApi>,
}

impl RemoteHistory {
    pub fn new(api: Arc<dyn ConversationApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl HistorySource for RemoteHistory {
    async fn load(&self) -> Result<Vec<HistoryEntry>, ApiError> {
        let records = self.api.list_conversations(REMOTE_HISTORY_LIMIT).await?;
        Ok(records.into_iter().map(HistoryEntry::from).collect())
    }

    // The server records conversations itself as chat and report calls happen
    async fn save(&self, _entries: &mut Vec<HistoryEntry>, entry: HistoryEntry) {
        log::debug!("Skipping local save of {}; server already has it", entry.id);
    }

    async fn delete(&self, entries: &mut Vec<HistoryEntry>, id: &str) -> Result<(), ApiError> {
        let remote_id = entries
            .iter()
            .find(|entry| entry.id == id)
            .and_then(|entry| entry.remote_id.clone())
            .unwrap_or_else(|| id.to_string());
        self.api.delete_conversation(&remote_id).await?;
        entries.retain(|entry| entry.id != id);
        Ok(())
    }

    // No bulk delete endpoint; only the in-memory view is emptied
    async fn clear(&self, entries: &mut Vec<HistoryEntry>) {
        entries.clear();
    }

    async fn fetch(&self, id: &str) -> Result<Option<HistoryEntry>, ApiError> {
        match self.api.get_conversation(id).await {
            Ok(record) => Ok(Some(HistoryEntry::from(record))),
            Err(e) if e.status() == Some(404) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

pub struct HistoryStore {
    entries: Vec<HistoryEntry>,
    local: LocalHistory,
    remote: RemoteHistory,
}

impl HistoryStore {
    pub fn new(cache: LocalCache, api: Arc<dyn ConversationApi>) -> Self {
        Self {
            entries: Vec::new(),
            local: LocalHistory::new(cache),
            remote: RemoteHistory::new(api),
        }
    }

    fn source(&self, identity: Identity) -> &dyn HistorySource {
        match identity {
            Identity::Anonymous => &self.local,
            Identity::Authenticated => &self.remote,
        }
    }

    fn split(&mut self, identity: Identity) -> (&dyn HistorySource, &mut Vec<HistoryEntry>) {
        let source: &dyn HistorySource = match identity {
            Identity::Anonymous => &self.local,
            Identity::Authenticated => &self.remote,
        };
        (source, &mut self.entries)
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// Loads the list for `identity`; a failing server falls back to the local cache.
    pub async fn load(&mut self, identity: Identity) {
        let loaded = match self.source(identity).load().await {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("Failed to load remote history, using local cache: {}", e);
                self.local.read().await
            }
        };
        self.entries = loaded;
    }

    pub async fn save(
        &mut self,
        identity: Identity,
        conversation: &ConversationData,
        report: Option<Report>,
    ) {
        let entry = HistoryEntry {
            id: conversation.session_id.to_string(),
            remote_id: None,
            language: conversation.language,
            scenario: conversation.scenario,
            messages: conversation.messages.clone(),
            report,
            timestamp: iso_now(),
        };
        let (source, entries) = self.split(identity);
        source.save(entries, entry).await;
    }

    /// Removes `id`. Remote deletes leave the list untouched when the call fails.
    pub async fn delete(&mut self, identity: Identity, id: &str) -> Result<(), ApiError> {
        let (source, entries) = self.split(identity);
        source.delete(entries, id).await
    }

    pub async fn clear(&mut self, identity: Identity) {
        let (source, entries) = self.split(identity);
        source.clear(entries).await;
    }

    pub fn find(&self, id: &str) -> Option<&HistoryEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    /// Looks `id` up in the loaded list, then asks the current source.
    pub async fn get_conversation(
        &self,
        identity: Identity,
        id: &str,
    ) -> Result<Option<HistoryEntry>, ApiError> {
        if let Some(entry) = self.find(id) {
            return Ok(Some(entry.clone()));
        }
        self.source(identity).fetch(id).await
    }

    /// Everything in the local cache, whoever is signed in.
    pub async fn all_local_entries(&self) -> Vec<HistoryEntry> {
        self.local.read().await
    }

    pub async fn clear_all_local_entries(&self) {
        self.local.cache.remove_item(HISTORY_KEY).await;
    }
}
