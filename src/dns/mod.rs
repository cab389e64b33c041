//! Name resolution: system, specific server, or iterative from the roots

pub mod root;
pub mod server;

use crate::{
    error::{AppError, Result},
    models::PingConfig,
    types::{DnsMode, IpFamily},
};
use root::RootResolver;
use server::ServerResolver;
use std::collections::HashMap;
use std::net::IpAddr;

/// Resolution strategy, chosen once at construction
#[derive(Debug, Clone)]
enum Strategy {
    System,
    Server(ServerResolver),
    Root(RootResolver),
}

/// Resolves hostnames for one web client
///
/// When caching is enabled the first successful answer for a hostname is
/// kept for the lifetime of the resolver, regardless of its TTL. The cache
/// is owned by the resolver and only touched from `resolve`.
#[derive(Debug, Clone)]
pub struct Resolver {
    strategy: Strategy,
    family: IpFamily,
    cache: Option<HashMap<String, IpAddr>>,
    lookups: usize,
}

impl Resolver {
    /// Build the resolver described by the configuration
    pub async fn new(config: &PingConfig) -> Result<Self> {
        let strategy = match &config.dns {
            DnsMode::System => Strategy::System,
            DnsMode::Server(server) => Strategy::Server(ServerResolver::new(server, config.wait).await?),
            DnsMode::FullRoot => Strategy::Root(RootResolver::new(config.ip_family, config.wait)),
        };

        Ok(Self {
            strategy,
            family: config.ip_family,
            cache: config.cache_dns.then(HashMap::new),
            lookups: 0,
        })
    }

    /// A system resolver for the given family, without cache
    pub fn system(family: IpFamily) -> Self {
        Self {
            strategy: Strategy::System,
            family,
            cache: None,
            lookups: 0,
        }
    }

    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache = enabled.then(HashMap::new);
        self
    }

    /// Human-readable name of the strategy in use
    pub fn mode_name(&self) -> String {
        match &self.strategy {
            Strategy::System => "system".to_string(),
            Strategy::Server(server) => format!("server {}", server.server()),
            Strategy::Root(_) => "full resolution".to_string(),
        }
    }

    /// Number of network resolutions performed so far
    pub fn lookups(&self) -> usize {
        self.lookups
    }

    /// Resolve a hostname to one address of the configured family
    pub async fn resolve(&mut self, host: &str) -> Result<IpAddr> {
        let host = host.trim_start_matches('[').trim_end_matches(']');

        if let Ok(ip) = host.parse::<IpAddr>() {
            return if self.family.accepts(&ip) {
                Ok(ip)
            } else {
                Err(AppError::dns_resolution(format!(
                    "address {}: no suitable address for {}",
                    ip, self.family
                )))
            };
        }

        if let Some(ip) = self.cache.as_ref().and_then(|cache| cache.get(host)) {
            return Ok(*ip);
        }

        self.lookups += 1;
        let ips = match &self.strategy {
            Strategy::System => system_lookup(host, self.family).await?,
            Strategy::Server(server) => server.lookup(host, self.family).await?,
            Strategy::Root(root) => root.lookup(host).await?,
        };

        let ip = ips
            .into_iter()
            .find(|ip| self.family.accepts(ip))
            .ok_or_else(|| AppError::no_such_host(host))?;

        if let Some(cache) = self.cache.as_mut() {
            cache.insert(host.to_string(), ip);
        }
        Ok(ip)
    }

    /// Resolve the host part of `host:port`, keeping the port as is
    pub async fn resolve_conn(&mut self, addr: &str) -> Result<String> {
        let (host, port) = split_host_port(addr)?;
        let ip = self.resolve(&host).await?;
        Ok(join_host_port(&ip.to_string(), port))
    }
}

async fn system_lookup(host: &str, family: IpFamily) -> Result<Vec<IpAddr>> {
    let addrs = tokio::net::lookup_host((host, 0))
        .await
        .map_err(|e| AppError::dns_resolution(format!("lookup {}: {}", host, e)))?;
    Ok(addrs.map(|addr| addr.ip()).filter(|ip| family.accepts(ip)).collect())
}

/// Split `host:port` or `[v6]:port` into its parts
pub fn split_host_port(addr: &str) -> Result<(String, u16)> {
    let (host, port) = if let Some(rest) = addr.strip_prefix('[') {
        let (host, port) = rest
            .split_once("]:")
            .ok_or_else(|| AppError::parse(format!("address {}: missing port", addr)))?;
        (host, port)
    } else {
        let (host, port) = addr
            .rsplit_once(':')
            .ok_or_else(|| AppError::parse(format!("address {}: missing port", addr)))?;
        if host.contains(':') {
            return Err(AppError::parse(format!("address {}: too many colons", addr)));
        }
        (host, port)
    };

    let port = port
        .parse::<u16>()
        .map_err(|_| AppError::parse(format!("address {}: invalid port", addr)))?;
    Ok((host.to_string(), port))
}

/// Join a host and a port, bracketing IPv6 hosts
pub fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_host_port() {
        assert_eq!(split_host_port("example.com:80").unwrap(), ("example.com".to_string(), 80));
        assert_eq!(split_host_port("[2001:db8::1]:443").unwrap(), ("2001:db8::1".to_string(), 443));
        assert!(split_host_port("example.com").is_err());
        assert!(split_host_port("2001:db8::1").is_err());
        assert!(split_host_port("example.com:http").is_err());
        assert!(split_host_port("[2001:db8::1]").is_err());
    }

    #[test]
    fn test_join_host_port() {
        assert_eq!(join_host_port("192.0.2.1", 8080), "192.0.2.1:8080");
        assert_eq!(join_host_port("2001:db8::1", 443), "[2001:db8::1]:443");
    }

    #[tokio::test]
    async fn test_literal_needs_no_lookup() {
        let mut resolver = Resolver::system(IpFamily::Any);
        let ip = resolver.resolve("192.0.2.10").await.unwrap();
        assert_eq!(ip, "192.0.2.10".parse::<IpAddr>().unwrap());
        assert_eq!(resolver.lookups(), 0);
    }

    #[tokio::test]
    async fn test_literal_of_wrong_family() {
        let mut resolver = Resolver::system(IpFamily::V4);
        assert!(resolver.resolve("::1").await.is_err());
    }

    #[tokio::test]
    async fn test_resolve_conn_brackets_ipv6() {
        let mut resolver = Resolver::system(IpFamily::Any);
        assert_eq!(resolver.resolve_conn("[::1]:8443").await.unwrap(), "[::1]:8443");
        assert_eq!(resolver.resolve_conn("127.0.0.1:80").await.unwrap(), "127.0.0.1:80");
    }

    #[tokio::test]
    async fn test_cache_enabled_resolves_once() {
        let mut resolver = Resolver::system(IpFamily::V4).with_cache(true);
        let first = resolver.resolve("localhost").await.unwrap();
        let second = resolver.resolve("localhost").await.unwrap();

        assert_eq!(first, second);
        assert!(first.is_loopback());
        assert_eq!(resolver.lookups(), 1);
    }

    #[tokio::test]
    async fn test_cache_disabled_resolves_every_time() {
        let mut resolver = Resolver::system(IpFamily::V4);
        resolver.resolve("localhost").await.unwrap();
        resolver.resolve("localhost").await.unwrap();
        assert_eq!(resolver.lookups(), 2);
    }

    #[tokio::test]
    async fn test_resolver_from_config() {
        let mut config = PingConfig::new("http://example.com/");
        config.dns = DnsMode::Server("192.0.2.53".to_string());
        config.cache_dns = true;

        let resolver = Resolver::new(&config).await.unwrap();
        assert_eq!(resolver.mode_name(), "server 192.0.2.53:53");
        assert!(resolver.cache.is_some());

        config.dns = DnsMode::FullRoot;
        let resolver = Resolver::new(&config).await.unwrap();
        assert_eq!(resolver.mode_name(), "full resolution");
    }
}
