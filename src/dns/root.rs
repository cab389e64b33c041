//! Iterative resolution starting at the root name servers

use crate::error::{AppError, Result};
use crate::types::IpFamily;
use futures::future::{BoxFuture, FutureExt};
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use trust_dns_resolver::proto::{
    op::{Message, MessageType, OpCode, Query, ResponseCode},
    rr::{Name, RData, RecordType},
};

/// IPv4 addresses of the thirteen root servers, a through m
const ROOT_SERVERS: [Ipv4Addr; 13] = [
    Ipv4Addr::new(198, 41, 0, 4),
    Ipv4Addr::new(170, 247, 170, 2),
    Ipv4Addr::new(192, 33, 4, 12),
    Ipv4Addr::new(199, 7, 91, 13),
    Ipv4Addr::new(192, 203, 230, 10),
    Ipv4Addr::new(192, 5, 5, 241),
    Ipv4Addr::new(192, 112, 36, 4),
    Ipv4Addr::new(198, 97, 190, 53),
    Ipv4Addr::new(192, 36, 148, 17),
    Ipv4Addr::new(192, 58, 128, 30),
    Ipv4Addr::new(193, 0, 14, 129),
    Ipv4Addr::new(199, 7, 83, 42),
    Ipv4Addr::new(202, 12, 27, 33),
];

/// Longest CNAME chain followed before giving up
pub const MAX_CNAME_DEPTH: usize = 8;
/// Referrals followed for one name before giving up
pub const MAX_REFERRALS: usize = 16;
/// Nesting of name server address lookups (glueless delegations)
pub const MAX_NS_DEPTH: usize = 3;

const MAX_UDP_RESPONSE: usize = 4096;

/// What one response tells us about the name being resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Addresses of the requested type
    Answer(Vec<IpAddr>),
    /// The name is an alias; resolution continues at the target
    Alias(Name),
    /// Ask these servers next; `glue` carries the addresses that came along
    Referral { ns: Vec<Name>, glue: Vec<IpAddr> },
    /// The name exists but has no record of the requested type
    NoData,
}

/// Classify a non-recursive response for `name`/`record_type`
///
/// CNAME chains contained in the answer section are followed in place.
pub fn classify(response: &Message, name: &Name, record_type: RecordType) -> Step {
    let mut target = name.clone();

    for _ in 0..=response.answers().len() {
        let mut ips = Vec::new();
        let mut alias = None;

        for record in response.answers().iter().filter(|r| r.name() == &target) {
            match record.data() {
                Some(RData::A(a)) if record_type == RecordType::A => ips.push(IpAddr::V4(a.0)),
                Some(RData::AAAA(aaaa)) if record_type == RecordType::AAAA => {
                    ips.push(IpAddr::V6(aaaa.0))
                }
                Some(RData::CNAME(cname)) => alias = Some(cname.0.clone()),
                _ => {}
            }
        }

        if !ips.is_empty() {
            return Step::Answer(ips);
        }
        match alias {
            Some(next) => target = next,
            None => break,
        }
    }

    if &target != name {
        return Step::Alias(target);
    }

    let ns: Vec<Name> = response
        .name_servers()
        .iter()
        .filter_map(|record| match record.data() {
            Some(RData::NS(ns)) => Some(ns.0.clone()),
            _ => None,
        })
        .collect();

    if ns.is_empty() {
        return Step::NoData;
    }

    let glue = response
        .additionals()
        .iter()
        .filter(|record| ns.iter().any(|n| n == record.name()))
        .filter_map(|record| match record.data() {
            Some(RData::A(a)) => Some(IpAddr::V4(a.0)),
            _ => None,
        })
        .collect();

    Step::Referral { ns, glue }
}

/// Resolver walking the delegation tree from the root, without recursion
/// from any upstream server
#[derive(Debug, Clone)]
pub struct RootResolver {
    family: IpFamily,
    timeout: Duration,
    roots: Vec<IpAddr>,
    port: u16,
}

impl RootResolver {
    pub fn new(family: IpFamily, timeout: Duration) -> Self {
        Self {
            family,
            timeout,
            roots: ROOT_SERVERS.iter().map(|ip| IpAddr::V4(*ip)).collect(),
            port: crate::defaults::DNS_PORT,
        }
    }

    /// Start every walk at `roots` instead of the root servers, and talk to
    /// all name servers on `port`
    pub fn with_roots(mut self, roots: Vec<IpAddr>, port: u16) -> Self {
        self.roots = roots;
        self.port = port;
        self
    }

    fn record_types(&self) -> &'static [RecordType] {
        match self.family {
            IpFamily::Any => &[RecordType::A, RecordType::AAAA],
            IpFamily::V4 => &[RecordType::A],
            IpFamily::V6 => &[RecordType::AAAA],
        }
    }

    /// Resolve `host`, restarting from the root for every alias met
    pub async fn lookup(&self, host: &str) -> Result<Vec<IpAddr>> {
        let mut name = Name::from_ascii(host)?;
        name.set_fqdn(true);

        let mut visited = HashSet::new();
        for _ in 0..=MAX_CNAME_DEPTH {
            if !visited.insert(name.to_lowercase()) {
                return Err(AppError::dns_resolution(format!("lookup {}: CNAME loop at {}", host, name)));
            }

            let mut alias = None;
            let mut last_error = None;
            for &record_type in self.record_types() {
                match self.iterate(&name, record_type, 0).await {
                    Ok(Step::Answer(ips)) => return Ok(ips),
                    Ok(Step::Alias(target)) => {
                        alias.get_or_insert(target);
                    }
                    Ok(_) => {}
                    // a failed A walk must not hide a usable AAAA answer
                    Err(e) => last_error = Some(e),
                }
            }

            match (alias, last_error) {
                (Some(target), _) => name = target,
                (None, Some(e)) => return Err(e),
                (None, None) => return Err(AppError::no_such_host(host)),
            }
        }

        Err(AppError::dns_resolution(format!("lookup {}: CNAME chain too long", host)))
    }

    fn iterate<'a>(&'a self, name: &'a Name, record_type: RecordType, depth: usize) -> BoxFuture<'a, Result<Step>> {
        async move {
            let mut servers = self.roots.clone();

            for _ in 0..MAX_REFERRALS {
                let response = self.ask_any(&servers, name, record_type).await?;
                if response.response_code() == ResponseCode::NXDomain {
                    return Err(AppError::no_such_host(&name.to_string()));
                }

                match classify(&response, name, record_type) {
                    Step::Referral { ns, glue } => {
                        servers = if glue.is_empty() {
                            self.resolve_name_servers(&ns, depth).await?
                        } else {
                            glue
                        };
                    }
                    step => return Ok(step),
                }
            }

            Err(AppError::dns_resolution(format!("lookup {}: too many referrals", name)))
        }
        .boxed()
    }

    async fn resolve_name_servers(&self, ns: &[Name], depth: usize) -> Result<Vec<IpAddr>> {
        if depth >= MAX_NS_DEPTH {
            return Err(AppError::dns_resolution("name server delegation too deep"));
        }

        let mut last_error = None;
        for server in ns {
            match self.iterate(server, RecordType::A, depth + 1).await {
                Ok(Step::Answer(ips)) => return Ok(ips),
                Ok(_) => {}
                Err(e) => last_error = Some(e),
            }
        }

        Err(last_error.unwrap_or_else(|| AppError::dns_resolution("no usable name server address")))
    }

    /// Ask the servers in turn until one gives a usable response
    async fn ask_any(&self, servers: &[IpAddr], name: &Name, record_type: RecordType) -> Result<Message> {
        let mut last_error = None;
        for &server in servers {
            let addr = SocketAddr::new(server, self.port);
            match tokio::time::timeout(self.timeout, exchange(addr, name, record_type)).await {
                Ok(Ok(response)) => match response.response_code() {
                    ResponseCode::NoError | ResponseCode::NXDomain => return Ok(response),
                    code => {
                        last_error = Some(AppError::dns_resolution(format!("{} answered {}", server, code)))
                    }
                },
                Ok(Err(e)) => last_error = Some(e),
                Err(_) => last_error = Some(AppError::timeout(format!("no answer from {}", server))),
            }
        }
        Err(last_error.unwrap_or_else(|| AppError::dns_resolution("no name server to ask")))
    }
}

fn build_query(name: &Name, record_type: RecordType) -> Message {
    let mut message = Message::new();
    message
        .set_id(rand::random())
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(false)
        .add_query(Query::query(name.clone(), record_type));
    message
}

/// One query over UDP, retried over TCP when the answer is truncated
async fn exchange(server: SocketAddr, name: &Name, record_type: RecordType) -> Result<Message> {
    let query = build_query(name, record_type);
    let bytes = query.to_vec()?;

    let bind: SocketAddr = if server.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
    };
    let socket = UdpSocket::bind(bind).await?;
    socket.connect(server).await?;
    socket.send(&bytes).await?;

    let mut buf = vec![0u8; MAX_UDP_RESPONSE];
    let response = loop {
        let n = socket.recv(&mut buf).await?;
        let response = Message::from_vec(&buf[..n])?;
        if response.id() == query.id() {
            break response;
        }
    };

    if response.truncated() {
        return exchange_tcp(server, &bytes, query.id()).await;
    }
    Ok(response)
}

async fn exchange_tcp(server: SocketAddr, bytes: &[u8], id: u16) -> Result<Message> {
    let mut stream = TcpStream::connect(server).await?;
    let len = u16::try_from(bytes.len()).map_err(|_| AppError::internal("DNS query too large"))?;
    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(bytes).await?;

    let len = stream.read_u16().await? as usize;
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await?;

    let response = Message::from_vec(&buf)?;
    if response.id() != id {
        return Err(AppError::dns_resolution("mismatched DNS response id"));
    }
    Ok(response)
}
