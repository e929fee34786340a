//! Short-lived identity tokens for service-to-service calls.
pub mod cache;
pub mod issuer;

pub use cache::TokenCache;
pub use issuer::{IdTokenIssuer, IssuanceError, ServiceAccount};
