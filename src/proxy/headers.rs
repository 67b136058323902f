//! HTTP header constants and the forwarding header rewrite
//!
//! Centralizes header names used by the proxy and the rewrite applied to
//! every forwarded request. The rewrite is observability metadata only and
//! never alters where the request is routed.

use http::header::{HeaderMap, HeaderValue, HOST};

/// Header carrying the host the client originally addressed
pub const X_FORWARDED_HOST: &str = "x-forwarded-host";

/// Header identifying this proxy on forwarded requests
pub const X_PROXY_AGENT: &str = "x-proxy-agent";

/// Value written into [`X_PROXY_AGENT`]
pub const PROXY_AGENT: &str = "gatehouse";

/// Well-known paths
pub mod paths {
    /// Default path when none is specified
    pub const DEFAULT: &str = "/";

    /// Health check endpoint path
    pub const HEALTH: &str = "/health";
}

/// Rewrite headers on a request about to be forwarded: point `Host` at the
/// target, preserve the originally addressed host in `X-Forwarded-Host`, and
/// mark the request as having passed through this proxy.
pub fn apply_forwarding_headers(headers: &mut HeaderMap, target_host: &str) {
    let original_host = headers
        .get(HOST)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string);

    if let Ok(value) = HeaderValue::from_str(target_host) {
        headers.insert(HOST, value);
    }

    let forwarded = original_host.as_deref().unwrap_or(target_host);
    if let Ok(value) = HeaderValue::from_str(forwarded) {
        headers.insert(X_FORWARDED_HOST, value);
    }

    headers.insert(X_PROXY_AGENT, HeaderValue::from_static(PROXY_AGENT));
}
