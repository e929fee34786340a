//! Caller identity helpers shared by the pipeline stages.
use std::net::{IpAddr, SocketAddr};

use http::{HeaderMap, header};

const CF_CONNECTING_IP: &str = "cf-connecting-ip";
const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Bearer token from the `Authorization` header.
///
/// The value must start with `Bearer ` and the trimmed remainder must be
/// non-empty.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}

/// Resolves the caller's IP address.
///
/// `cf-connecting-ip` and `X-Forwarded-For` are client-controlled, so they
/// are only honoured when the socket peer is one of the trusted proxies.
/// Everyone else is identified by the peer address.
#[derive(Debug, Clone, Default)]
pub struct ClientIpResolver {
    trusted_proxies: Vec<IpAddr>,
}

impl ClientIpResolver {
    pub fn new(trusted_proxies: Vec<IpAddr>) -> Self {
        Self { trusted_proxies }
    }

    fn trusts(&self, peer: Option<SocketAddr>) -> bool {
        peer.is_some_and(|addr| self.trusted_proxies.contains(&addr.ip()))
    }

    /// `cf-connecting-ip`, then the first `X-Forwarded-For` hop when the peer
    /// is trusted; the peer address otherwise.
    pub fn resolve(&self, headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
        let from_header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.split(',').next().unwrap_or_default().trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let forwarded = if self.trusts(peer) {
            from_header(CF_CONNECTING_IP).or_else(|| from_header(X_FORWARDED_FOR))
        } else {
            None
        };
        forwarded.or_else(|| peer.map(|addr| addr.ip().to_string()))
    }
}
