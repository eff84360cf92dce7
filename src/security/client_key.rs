//! Client identity for rate limiting.
//!
//! The key is the first non-empty value of `X-Forwarded-For`, `X-Real-IP`,
//! and the peer IP. Whether the two headers are believed, and how much of
//! the forwarded chain is, depends on [`ForwardedHeaders`].

use std::net::IpAddr;

use axum::http::HeaderMap;
use serde::Deserialize;

/// Key used when neither headers nor a peer address are available.
pub const UNKNOWN_CLIENT: &str = "unknown";

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_REAL_IP: &str = "x-real-ip";

/// Config value for `security.forwarded_headers`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForwardedHeaderMode {
    /// Believe the headers from any peer.
    Always,
    /// Believe the headers only from `security.trusted_proxies`.
    #[default]
    Trusted,
    /// Ignore the headers.
    Never,
}

/// Which peers may set the client identity through proxy headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardedHeaders {
    Always,
    Trusted(Vec<IpAddr>),
    Never,
}

impl Default for ForwardedHeaders {
    fn default() -> Self {
        Self::Trusted(vec![
            IpAddr::from([127, 0, 0, 1]),
            IpAddr::from([0, 0, 0, 0, 0, 0, 0, 1]),
        ])
    }
}

impl ForwardedHeaders {
    #[must_use]
    pub fn from_mode(mode: ForwardedHeaderMode, trusted_proxies: &[IpAddr]) -> Self {
        match mode {
            ForwardedHeaderMode::Always => Self::Always,
            ForwardedHeaderMode::Trusted => Self::Trusted(trusted_proxies.to_vec()),
            ForwardedHeaderMode::Never => Self::Never,
        }
    }

    fn trusts(&self, peer: Option<IpAddr>) -> bool {
        match self {
            Self::Always => true,
            Self::Trusted(proxies) => peer.is_some_and(|ip| proxies.contains(&ip)),
            Self::Never => false,
        }
    }
}

/// Derive the rate-limit key for a request.
///
/// With [`ForwardedHeaders::Always`] the whole `X-Forwarded-For` value is the
/// key. With [`ForwardedHeaders::Trusted`] the chain is read from the right,
/// skipping allowlisted proxies, so entries a client prepends are never
/// reached.
#[must_use]
pub fn client_key(headers: &HeaderMap, peer: Option<IpAddr>, policy: &ForwardedHeaders) -> String {
    if policy.trusts(peer) {
        let forwarded = header_str(headers, X_FORWARDED_FOR).and_then(|chain| match policy {
            ForwardedHeaders::Trusted(proxies) => nearest_untrusted_hop(chain, proxies),
            _ => Some(chain),
        });
        if let Some(key) = forwarded.or_else(|| header_str(headers, X_REAL_IP)) {
            return key.to_string();
        }
    }

    peer.map_or_else(|| UNKNOWN_CLIENT.to_string(), |ip| ip.to_string())
}

/// Rightmost entry of `chain` that is not one of `proxies`.
///
/// An entry that is not an IP address stops the walk and is returned as is.
fn nearest_untrusted_hop<'a>(chain: &'a str, proxies: &[IpAddr]) -> Option<&'a str> {
    chain
        .rsplit(',')
        .map(str::trim)
        .filter(|hop| !hop.is_empty())
        .find(|hop| !hop.parse::<IpAddr>().is_ok_and(|ip| proxies.contains(&ip)))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    fn ip(s: &str) -> Option<IpAddr> {
        Some(s.parse().unwrap())
    }

    #[test]
    fn test_precedence_when_trusted() {
        let policy = ForwardedHeaders::Always;
        let both = headers(&[(X_FORWARDED_FOR, "203.0.113.7"), (X_REAL_IP, "198.51.100.2")]);
        assert_eq!(client_key(&both, ip("10.0.0.1"), &policy), "203.0.113.7");

        let real_only = headers(&[(X_REAL_IP, "198.51.100.2")]);
        assert_eq!(client_key(&real_only, ip("10.0.0.1"), &policy), "198.51.100.2");

        let empty_xff = headers(&[(X_FORWARDED_FOR, "  "), (X_REAL_IP, "198.51.100.2")]);
        assert_eq!(client_key(&empty_xff, ip("10.0.0.1"), &policy), "198.51.100.2");

        assert_eq!(client_key(&HeaderMap::new(), ip("10.0.0.1"), &policy), "10.0.0.1");
    }

    #[test]
    fn test_trusted_chain_uses_nearest_untrusted_hop() {
        // The proxy appended the real client; everything before it is client-supplied.
        let chain = headers(&[(X_FORWARDED_FOR, "10.9.3.1, 198.51.100.9")]);
        assert_eq!(
            client_key(&chain, ip("127.0.0.1"), &ForwardedHeaders::default()),
            "198.51.100.9"
        );

        // Allowlisted hops at the end of the chain are skipped.
        let policy = ForwardedHeaders::Trusted(vec![
            ip("127.0.0.1").unwrap(),
            ip("10.0.0.2").unwrap(),
        ]);
        let multi_hop = headers(&[(X_FORWARDED_FOR, "1.2.3.4, 198.51.100.9, 10.0.0.2")]);
        assert_eq!(client_key(&multi_hop, ip("127.0.0.1"), &policy), "198.51.100.9");

        // Only proxies in the chain: fall back to the next source.
        let only_proxies = headers(&[(X_FORWARDED_FOR, "10.0.0.2"), (X_REAL_IP, "198.51.100.2")]);
        assert_eq!(client_key(&only_proxies, ip("127.0.0.1"), &policy), "198.51.100.2");
    }

    #[test]
    fn test_forged_prefix_does_not_escape_limit() {
        let limiter = crate::security::RateLimiter::default();
        let policy = ForwardedHeaders::default();

        let admitted = (0..50)
            .filter(|i| {
                let value = format!("10.9.{i}.1, 198.51.100.9");
                let mut map = HeaderMap::new();
                map.insert(X_FORWARDED_FOR, HeaderValue::from_str(&value).unwrap());
                limiter.admit(&client_key(&map, ip("127.0.0.1"), &policy))
            })
            .count();
        assert_eq!(admitted, 10);
    }

    #[test]
    fn test_always_keys_on_whole_header() {
        let chain = headers(&[(X_FORWARDED_FOR, "203.0.113.7, 10.0.0.2")]);
        assert_eq!(
            client_key(&chain, ip("192.0.2.10"), &ForwardedHeaders::Always),
            "203.0.113.7, 10.0.0.2"
        );
    }

    #[test]
    fn test_untrusted_peer_cannot_spoof() {
        let spoofed = headers(&[(X_FORWARDED_FOR, "1.2.3.4"), (X_REAL_IP, "5.6.7.8")]);
        let policy = ForwardedHeaders::default();
        assert_eq!(client_key(&spoofed, ip("192.0.2.10"), &policy), "192.0.2.10");
        assert_eq!(client_key(&spoofed, ip("127.0.0.1"), &policy), "1.2.3.4");
        assert_eq!(client_key(&spoofed, ip("::1"), &policy), "1.2.3.4");
    }

    #[test]
    fn test_never_uses_peer() {
        let spoofed = headers(&[(X_FORWARDED_FOR, "1.2.3.4")]);
        assert_eq!(
            client_key(&spoofed, ip("127.0.0.1"), &ForwardedHeaders::Never),
            "127.0.0.1"
        );
    }

    #[test]
    fn test_missing_peer() {
        let spoofed = headers(&[(X_FORWARDED_FOR, "1.2.3.4")]);
        assert_eq!(
            client_key(&spoofed, None, &ForwardedHeaders::default()),
            UNKNOWN_CLIENT
        );
        assert_eq!(client_key(&spoofed, None, &ForwardedHeaders::Always), "1.2.3.4");
    }

    #[test]
    fn test_from_mode() {
        let proxies = vec![ip("10.1.1.1").unwrap()];
        assert_eq!(
            ForwardedHeaders::from_mode(ForwardedHeaderMode::Trusted, &proxies),
            ForwardedHeaders::Trusted(proxies.clone())
        );
        assert_eq!(
            ForwardedHeaders::from_mode(ForwardedHeaderMode::Always, &proxies),
            ForwardedHeaders::Always
        );
    }
}
