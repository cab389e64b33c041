//! Resolution against one specific DNS server

use crate::error::{AppError, Result};
use crate::types::IpFamily;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use trust_dns_resolver::{
    config::{NameServerConfigGroup, ResolverConfig, ResolverOpts},
    error::ResolveErrorKind,
    proto::rr::RecordType,
    TokioAsyncResolver,
};

/// Queries a single server directly, with no caching on the resolver side
#[derive(Clone)]
pub struct ServerResolver {
    resolver: TokioAsyncResolver,
    server: SocketAddr,
}

impl std::fmt::Debug for ServerResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerResolver").field("server", &self.server).finish()
    }
}

impl ServerResolver {
    /// Build a resolver for `server`, given as `ip`, `host`, `ip:port` or `host:port`
    ///
    /// A server given by name is looked up once with the system resolver;
    /// failing that lookup fails construction.
    pub async fn new(server: &str, timeout: Duration) -> Result<Self> {
        let (host, port) = match super::split_host_port(server) {
            Ok((host, port)) => (host, port),
            Err(_) => (server.trim_matches(|c| c == '[' || c == ']').to_string(), crate::defaults::DNS_PORT),
        };

        let ip = match host.parse::<IpAddr>() {
            Ok(ip) => ip,
            Err(_) => tokio::net::lookup_host((host.as_str(), port))
                .await
                .map_err(|e| AppError::dns_resolution(format!("lookup {}: {}", host, e)))?
                .map(|addr| addr.ip())
                .next()
                .ok_or_else(|| AppError::no_such_host(&host))?,
        };

        let config = ResolverConfig::from_parts(
            None,
            vec![],
            NameServerConfigGroup::from_ips_clear(&[ip], port, true),
        );

        let mut opts = ResolverOpts::default();
        opts.cache_size = 0;
        opts.timeout = timeout;
        opts.attempts = 1;
        opts.ndots = 0;

        Ok(Self {
            resolver: TokioAsyncResolver::tokio(config, opts),
            server: SocketAddr::new(ip, port),
        })
    }

    pub fn server(&self) -> SocketAddr {
        self.server
    }

    /// All addresses of `host` in the requested family
    ///
    /// With an unconstrained family the A and AAAA queries race; see
    /// [`race_dual_stack`].
    pub async fn lookup(&self, host: &str, family: IpFamily) -> Result<Vec<IpAddr>> {
        let fqdn = if host.ends_with('.') { host.to_string() } else { format!("{}.", host) };

        match family {
            IpFamily::V4 => query(self.resolver.clone(), fqdn, RecordType::A).await,
            IpFamily::V6 => query(self.resolver.clone(), fqdn, RecordType::AAAA).await,
            IpFamily::Any => {
                race_dual_stack(
                    host,
                    query(self.resolver.clone(), fqdn.clone(), RecordType::A),
                    query(self.resolver.clone(), fqdn, RecordType::AAAA),
                )
                .await
            }
        }
    }
}

async fn query(resolver: TokioAsyncResolver, fqdn: String, record_type: RecordType) -> Result<Vec<IpAddr>> {
    match resolver.lookup(fqdn.as_str(), record_type).await {
        Ok(lookup) => Ok(lookup.iter().filter_map(|rdata| rdata.ip_addr()).collect()),
        Err(e) => match e.kind() {
            ResolveErrorKind::NoRecordsFound { .. } => Ok(Vec::new()),
            _ => Err(e.into()),
        },
    }
}

/// Aborts the wrapped tasks when the race is abandoned or decided
struct AbortOnDrop(Vec<JoinHandle<()>>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        for task in &self.0 {
            task.abort();
        }
    }
}

/// Race an A query against an AAAA query
///
/// Non-empty A answers win as soon as they arrive. Otherwise both tasks are
/// awaited and their answers merged. Nothing found in either family is a
/// "no such host" failure.
pub async fn race_dual_stack<A, B>(host: &str, v4: A, v6: B) -> Result<Vec<IpAddr>>
where
    A: Future<Output = Result<Vec<IpAddr>>> + Send + 'static,
    B: Future<Output = Result<Vec<IpAddr>>> + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel(2);

    let tx_v4 = tx.clone();
    let task_v4 = tokio::spawn(async move {
        let _ = tx_v4.send((RecordType::A, v4.await)).await;
    });
    let task_v6 = tokio::spawn(async move {
        let _ = tx.send((RecordType::AAAA, v6.await)).await;
    });
    let _tasks = AbortOnDrop(vec![task_v4, task_v6]);

    let mut ips = Vec::new();
    while let Some((record_type, answer)) = rx.recv().await {
        if let Ok(found) = answer {
            if record_type == RecordType::A && !found.is_empty() {
                return Ok(found);
            }
            ips.extend(found);
        }
    }

    if ips.is_empty() {
        return Err(AppError::no_such_host(host));
    }
    Ok(ips)
}
