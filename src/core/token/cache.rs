use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ports::cache::CacheStore;

/// Entries this close to expiry are treated as absent.
pub const FRESHNESS_MARGIN_SECS: i64 = 300;

const KEY_BASE: &str = "https://cache/google-id-token";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredToken {
    token: String,
    /// Unix seconds.
    expires_at: i64,
}

/// Expiry-aware token cache layered over a [`CacheStore`].
///
/// The value and its absolute expiry are encoded together, so staleness is
/// decided here at read time rather than by the store's own TTL.
#[derive(Clone)]
pub struct TokenCache {
    store: Arc<dyn CacheStore>,
}

impl TokenCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Cache key for one (principal, audience) pair.
    pub fn key(principal: &str, audience: &str) -> String {
        format!(
            "{KEY_BASE}?email={}&audience={}",
            urlencoding::encode(principal),
            urlencoding::encode(audience)
        )
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        self.get_at(key, Utc::now()).await
    }

    /// Return the cached token unless it expires within the freshness margin
    /// of `now`.
    pub async fn get_at(&self, key: &str, now: DateTime<Utc>) -> Option<String> {
        let raw = self.store.get(key).await?;
        let stored: StoredToken = match serde_json::from_slice(&raw) {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!(error = %e, "Discarding unreadable token cache entry");
                return None;
            }
        };

        if now.timestamp() >= stored.expires_at - FRESHNESS_MARGIN_SECS {
            tracing::debug!("Cached token is within the freshness margin, ignoring");
            return None;
        }
        Some(stored.token)
    }

    pub async fn put(&self, key: &str, token: &str, expires_in_secs: u64) {
        self.put_at(key, token, expires_in_secs, Utc::now()).await;
    }

    pub async fn put_at(&self, key: &str, token: &str, expires_in_secs: u64, now: DateTime<Utc>) {
        if expires_in_secs == 0 {
            return;
        }
        let stored = StoredToken {
            token: token.to_string(),
            expires_at: now.timestamp().saturating_add_unsigned(expires_in_secs),
        };
        match serde_json::to_vec(&stored) {
            Ok(encoded) => {
                self.store
                    .put(key, Bytes::from(encoded), Duration::from_secs(expires_in_secs))
                    .await;
            }
            Err(e) => tracing::warn!(error = %e, "Failed to encode token cache entry"),
        }
    }
}
