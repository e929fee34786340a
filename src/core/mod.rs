pub mod access_token;
pub mod challenge;
pub mod cors;
pub mod credentials;
pub mod crypto;
pub mod gateway;
pub mod headers;
pub mod index_page;
pub mod rate_limiter;
pub mod request_info;
pub mod response_cache;
pub mod router;
pub mod signer;
pub mod size_limit;
pub mod token;

pub use gateway::GatewayService;
pub use rate_limiter::GatewayRateLimiter;
pub use router::{RouteDescriptor, RouteError, RouteTable};
