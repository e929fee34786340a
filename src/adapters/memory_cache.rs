use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use scc::HashMap;
use tokio::time::Instant;

use crate::ports::cache::CacheStore;

#[derive(Debug, Clone)]
struct StoredEntry {
    value: Bytes,
    expires_at: Instant,
}

/// In-process `CacheStore` backed by `scc::HashMap`.
///
/// An expired entry is dropped when it is read, and in bulk by
/// [`MemoryCacheStore::purge_expired`]. Overwriting a key replaces its value
/// and expiry.
#[derive(Clone, Default)]
pub struct MemoryCacheStore {
    entries: Arc<HashMap<String, StoredEntry>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove every entry whose TTL has elapsed; returns how many were dropped.
    pub async fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        let now = Instant::now();
        self.entries
            .retain_async(|_, stored| stored.expires_at > now)
            .await;
        before.saturating_sub(self.entries.len())
    }

    /// Number of entries held, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Option<Bytes> {
        let entry = self.entries.get_async(key).await?;
        if entry.get().expires_at <= Instant::now() {
            tracing::trace!(key = %key, "Cache entry expired");
            let _ = entry.remove_entry();
            return None;
        }
        Some(entry.get().value.clone())
    }

    async fn put(&self, key: &str, value: Bytes, ttl: Duration) {
        let stored = StoredEntry {
            value,
            expires_at: Instant::now() + ttl,
        };

        match self.entries.get_async(key).await {
            Some(mut occupied) => {
                *occupied.get_mut() = stored;
            }
            None => {
                // A concurrent writer may have inserted the key first; either value is acceptable.
                let _ = self.entries.insert_async(key.to_string(), stored).await;
            }
        }
    }
}
