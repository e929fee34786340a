use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

/// CacheStore is the port for the shared, addressable-by-key store backing
/// the token cache, the access-token outcome cache and the response cache.
///
/// Implementations only guarantee atomic single-key `get`/`put`. Concurrent
/// writers for the same key may race; the last write wins. An entry whose TTL
/// has elapsed must not be returned and should not outlive its TTL by more
/// than the implementation's purge interval.
#[async_trait]
pub trait CacheStore: Send + Sync + 'static {
    /// Fetch the value stored under `key`, if present and not expired.
    async fn get(&self, key: &str) -> Option<Bytes>;

    /// Store `value` under `key` for `ttl`. Failures are swallowed.
    async fn put(&self, key: &str, value: Bytes, ttl: Duration);
}
