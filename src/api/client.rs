//! Client identity resolution for rate limiting

use std::net::SocketAddr;

use axum::http::HeaderMap;

/// Bucket shared by every caller without a resolvable address
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Resolve the rate-limit key for a request.
///
/// Precedence: the trusted proxy header (first comma-separated entry), then
/// the transport peer IP, then [`UNKNOWN_CLIENT`].
pub fn resolve_client_identity(
    headers: &HeaderMap,
    trusted_header: Option<&str>,
    peer: Option<SocketAddr>,
) -> String {
    let forwarded = trusted_header
        .and_then(|name| headers.get(name))
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());

    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    match peer {
        Some(addr) => addr.ip().to_string(),
        None => UNKNOWN_CLIENT.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn peer() -> Option<SocketAddr> {
        Some("10.1.2.3:55000".parse().unwrap())
    }

    #[test]
    fn test_trusted_header_wins() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("203.0.113.7"));

        assert_eq!(resolve_client_identity(&headers, Some("x-real-ip"), peer()), "203.0.113.7");
    }

    #[test]
    fn test_first_forwarded_entry_is_used() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(" 198.51.100.4 , 10.0.0.1"));

        assert_eq!(
            resolve_client_identity(&headers, Some("x-forwarded-for"), peer()),
            "198.51.100.4"
        );
    }

    #[test]
    fn test_untrusted_header_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("203.0.113.7"));

        assert_eq!(resolve_client_identity(&headers, None, peer()), "10.1.2.3");
    }

    #[test]
    fn test_blank_header_falls_back_to_peer() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("  "));

        assert_eq!(resolve_client_identity(&headers, Some("x-real-ip"), peer()), "10.1.2.3");
    }

    #[test]
    fn test_unknown_without_header_or_peer() {
        assert_eq!(
            resolve_client_identity(&HeaderMap::new(), Some("x-real-ip"), None),
            UNKNOWN_CLIENT
        );
    }
}
