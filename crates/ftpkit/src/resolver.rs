//! Endpoint resolution with a short-lived cache.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::connection::IpVersion;
use crate::error::{Error, Result};

/// How long a successful resolution stays cached.
pub const CACHE_TTL: Duration = Duration::from_secs(60 * 60);

type CacheKey = (String, u16, IpVersion);

/// Resolves host names to socket addresses.
///
/// Successful lookups are cached per `(host, port, ip_version)` for
/// [`CACHE_TTL`]. Failures are never cached.
#[derive(Debug, Default)]
pub struct Resolver {
    cache: Mutex<HashMap<CacheKey, (SocketAddr, Instant)>>,
}

impl Resolver {
    /// Creates a resolver with an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves `host:port`, preferring addresses of `ip_version`.
    ///
    /// IP literals (including bracketed IPv6 such as `[::1]` or `[::1]:21`)
    /// are returned without a lookup.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for port 0 and [`Error::Resolve`] if
    /// the lookup produced no usable address.
    pub async fn resolve(&self, host: &str, port: u16, ip_version: IpVersion) -> Result<SocketAddr> {
        if port == 0 {
            return Err(Error::InvalidArgument(format!(
                "port must be in 1..=65535, got {port}"
            )));
        }

        if let Some(ip) = parse_ip_literal(host) {
            return Ok(SocketAddr::new(ip, port));
        }

        let key = (host.to_string(), port, ip_version);
        if let Some(addr) = self.cached(&key) {
            return Ok(addr);
        }

        let candidates: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
            .await
            .map_err(|e| Error::Resolve(format!("{host}: {e}")))?
            .collect();

        let addr = select_address(&candidates, ip_version)
            .ok_or_else(|| Error::Resolve(format!("{host}: no usable address")))?;

        debug!(host, port, %addr, "Resolved endpoint");
        self.store(key, addr);
        Ok(addr)
    }

    fn cached(&self, key: &CacheKey) -> Option<SocketAddr> {
        let mut cache = self.cache.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        match cache.get(key) {
            Some((addr, at)) if at.elapsed() < CACHE_TTL => Some(*addr),
            Some(_) => {
                cache.remove(key);
                None
            }
            None => None,
        }
    }

    fn store(&self, key: CacheKey, addr: SocketAddr) {
        self.cache
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(key, (addr, Instant::now()));
    }
}

/// Parses an IP literal, accepting `[v6]` and `[v6]:port` forms.
fn parse_ip_literal(host: &str) -> Option<IpAddr> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Some(ip);
    }

    let inner = host.strip_prefix('[')?;
    let end = inner.find(']')?;
    let rest = &inner[end + 1..];
    if !rest.is_empty() && !rest.starts_with(':') {
        return None;
    }
    inner[..end].parse::<IpAddr>().ok()
}

/// Picks the address matching `ip_version`, mapping across families if needed.
fn select_address(candidates: &[SocketAddr], ip_version: IpVersion) -> Option<SocketAddr> {
    let matches = |addr: &&SocketAddr| match ip_version {
        IpVersion::V4 => addr.is_ipv4(),
        IpVersion::V6 => addr.is_ipv6(),
    };

    if let Some(addr) = candidates.iter().find(matches) {
        return Some(*addr);
    }

    let fallback = candidates.first()?;
    let mapped = match (ip_version, fallback.ip()) {
        (IpVersion::V6, IpAddr::V4(v4)) => IpAddr::V6(v4.to_ipv6_mapped()),
        (IpVersion::V4, IpAddr::V6(v6)) => v6.to_ipv4_mapped().map_or(IpAddr::V6(v6), IpAddr::V4),
        (_, ip) => ip,
    };
    Some(SocketAddr::new(mapped, fallback.port()))
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use std::net::{Ipv4Addr, Ipv6Addr};

    use super::*;

    #[test]
    fn test_ip_literals() {
        assert_eq!(
            parse_ip_literal("192.168.1.1"),
            Some(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1)))
        );
        assert_eq!(parse_ip_literal("::1"), Some(IpAddr::V6(Ipv6Addr::LOCALHOST)));
        assert_eq!(parse_ip_literal("[::1]"), Some(IpAddr::V6(Ipv6Addr::LOCALHOST)));
        assert_eq!(parse_ip_literal("[::1]:21"), Some(IpAddr::V6(Ipv6Addr::LOCALHOST)));
        assert_eq!(parse_ip_literal("[::1]x"), None);
        assert_eq!(parse_ip_literal("ftp.example.com"), None);
    }

    #[test]
    fn test_select_prefers_requested_family() {
        let v4: SocketAddr = "10.0.0.1:21".parse().unwrap();
        let v6: SocketAddr = "[2001:db8::1]:21".parse().unwrap();

        assert_eq!(select_address(&[v6, v4], IpVersion::V4), Some(v4));
        assert_eq!(select_address(&[v4, v6], IpVersion::V6), Some(v6));
    }

    #[test]
    fn test_select_maps_v4_into_v6() {
        let v4: SocketAddr = "10.0.0.1:21".parse().unwrap();
        let selected = select_address(&[v4], IpVersion::V6).unwrap();
        assert_eq!(
            selected.ip(),
            IpAddr::V6(Ipv4Addr::new(10, 0, 0, 1).to_ipv6_mapped())
        );
        assert_eq!(selected.port(), 21);
    }

    #[test]
    fn test_select_maps_v6_into_v4() {
        let mapped = SocketAddr::new(IpAddr::V6(Ipv4Addr::new(10, 0, 0, 2).to_ipv6_mapped()), 21);
        let selected = select_address(&[mapped], IpVersion::V4).unwrap();
        assert_eq!(selected.ip(), IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)));

        let native: SocketAddr = "[2001:db8::1]:21".parse().unwrap();
        assert_eq!(select_address(&[native], IpVersion::V4), Some(native));
    }

    #[test]
    fn test_select_empty() {
        assert_eq!(select_address(&[], IpVersion::V4), None);
    }

    #[tokio::test]
    async fn test_resolve_literal() {
        let resolver = Resolver::new();
        let addr = resolver.resolve("127.0.0.1", 2121, IpVersion::V4).await.unwrap();
        assert_eq!(addr, "127.0.0.1:2121".parse().unwrap());
    }

    #[tokio::test]
    async fn test_resolve_rejects_port_zero() {
        let resolver = Resolver::new();
        let result = resolver.resolve("127.0.0.1", 0, IpVersion::V4).await;
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_resolve_localhost_is_cached() {
        let resolver = Resolver::new();
        let first = resolver.resolve("localhost", 21, IpVersion::V4).await.unwrap();
        assert!(resolver.cached(&("localhost".to_string(), 21, IpVersion::V4)).is_some());
        let second = resolver.resolve("localhost", 21, IpVersion::V4).await.unwrap();
        assert_eq!(first, second);
    }
}
