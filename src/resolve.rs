use log::debug;
use std::net::IpAddr;
use tokio::net::lookup_host;

use crate::error::ValidationError;

/// Turn a user-supplied host string into one numeric address.
///
/// Literal IPv4/IPv6 addresses are returned as-is without touching DNS.
/// Hostnames are resolved through the system resolver; IPv4 answers are
/// preferred when both families are returned.
pub async fn resolve_target(host: &str) -> Result<IpAddr, ValidationError> {
    let host = host.trim();
    if host.is_empty() {
        return Err(ValidationError::UnresolvableHost(host.to_string()));
    }
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }

    let addrs: Vec<IpAddr> = lookup_host((host, 0))
        .await
        .map_err(|_| ValidationError::UnresolvableHost(host.to_string()))?
        .map(|sa| sa.ip())
        .collect();
    debug!("{host} resolved to {addrs:?}");

    addrs
        .iter()
        .find(|ip| ip.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| ValidationError::UnresolvableHost(host.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[tokio::test]
    async fn literals_skip_dns() {
        assert_eq!(
            resolve_target("10.0.0.7").await.unwrap(),
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7))
        );
        assert_eq!(
            resolve_target("::1").await.unwrap(),
            IpAddr::V6(Ipv6Addr::LOCALHOST)
        );
    }

    #[tokio::test]
    async fn empty_and_garbage_hosts_fail() {
        assert!(resolve_target("   ").await.is_err());
        assert!(matches!(
            resolve_target("no such host.invalid").await,
            Err(ValidationError::UnresolvableHost(_))
        ));
    }

    #[tokio::test]
    async fn localhost_resolves() {
        let ip = resolve_target("localhost").await.unwrap();
        assert!(ip.is_loopback());
    }
}
