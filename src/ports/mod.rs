pub mod cache;
pub mod http_client;

pub use cache::CacheStore;
pub use http_client::{HttpClient, HttpClientError, HttpClientResult};
