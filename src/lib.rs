//! Edgeguard - an edge API gateway for serverless backends.
//!
//! Edgeguard receives inbound HTTP requests, classifies them by path against a
//! per-environment route table and runs them through an ordered policy
//! pipeline before forwarding them to the backend that owns the route.
//!
//! # Pipeline
//! 1. Request size limit (413 / 400)
//! 2. Per-(path, caller) rate limit (429)
//! 3. CORS preflight and origin/method enforcement (204 / 403 / 405)
//! 4. Documentation index at `/` and prefix redirects (302)
//! 5. Route resolution, first declared prefix wins (404)
//! 6. Challenge (anti-bot) token verification (403)
//! 7. Access token verification with a 15 minute outcome cache (401 / 503)
//! 8. Response cache lookup for cacheable `GET`/`HEAD` requests
//! 9. Credential attachment: AWS Signature Version 4, or a Google identity
//!    token in `X-Serverless-Authorization`
//! 10. Forwarding (503 when the backend is unreachable)
//! 11. Response cache store, detached from the response path
//!
//! Every response, rejections included, leaves through the header normalizer
//! which stamps the configured security headers and, for allow-listed
//! origins, the CORS response headers.
//!
//! # Quick Example
//! ```no_run
//! use std::{sync::Arc, time::Duration};
//!
//! use edgeguard::{GatewayService, HttpClientAdapter, HttpHandler, MemoryCacheStore};
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let config = edgeguard::config::loader::load_config(None)?;
//! let client = Arc::new(HttpClientAdapter::new(Duration::from_secs(30))?);
//! let gateway = GatewayService::new(Arc::new(config), client, Arc::new(MemoryCacheStore::new()))?;
//! let app = HttpHandler::new(Arc::new(gateway)).router();
//! # let _ = app;
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! Business logic lives in `core`. Everything it needs from the outside world
//! goes through the traits in `ports` (`HttpClient`, `CacheStore`), with the
//! production implementations in `adapters`. Shared caches are always passed
//! in explicitly; there is no process-global store.
//!
//! # Error Handling
//! Pipeline failures are [`error::GatewayError`] values rendered as
//! `{"error":{"message": ...}}`. Startup and configuration code returns
//! `eyre::Result<T>` with `WrapErr` context.
//!
//! # Concurrency & Data Structures
//! Shared maps use `scc::HashMap`. Concurrent misses for the same cache key
//! may each go upstream; the last write wins.
pub mod config;
pub mod error;
pub mod metrics;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

pub mod adapters;
pub mod core;

#[cfg(test)]
mod test_support;

pub use crate::{
    adapters::{HttpClientAdapter, HttpHandler, MemoryCacheStore},
    core::GatewayService,
    error::GatewayError,
    ports::{cache::CacheStore, http_client::HttpClient},
    utils::GracefulShutdown,
};
