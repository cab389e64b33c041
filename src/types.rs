//! Type definitions and aliases

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use serde::{Deserialize, Serialize};

// Re-export commonly used types
pub use crate::error::{AppError, Result};

/// IP family the target may be reached over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IpFamily {
    /// IPv4 or IPv6, whichever resolves
    #[default]
    Any,
    /// IPv4 only
    V4,
    /// IPv6 only
    V6,
}

impl IpFamily {
    /// Whether an address belongs to this family
    pub fn accepts(&self, ip: &IpAddr) -> bool {
        match self {
            IpFamily::Any => true,
            IpFamily::V4 => ip.is_ipv4(),
            IpFamily::V6 => ip.is_ipv6(),
        }
    }

    /// Short label, as used in error messages
    pub fn label(&self) -> &'static str {
        match self {
            IpFamily::Any => "ip",
            IpFamily::V4 => "ip4",
            IpFamily::V6 => "ip6",
        }
    }
}

impl fmt::Display for IpFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How hostnames are turned into addresses
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DnsMode {
    /// Use the platform resolver
    #[default]
    System,
    /// Query one DNS server directly; `host` or `host:port`
    Server(String),
    /// Iterate from the root name servers
    FullRoot,
}

impl DnsMode {
    /// Get a human-readable name for this DNS mode
    pub fn name(&self) -> String {
        match self {
            DnsMode::System => "system".to_string(),
            DnsMode::Server(server) => format!("server {}", server),
            DnsMode::FullRoot => "full resolution".to_string(),
        }
    }
}

/// A name/value pair: a header, a query parameter or a cookie
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameValue {
    pub name: String,
    pub value: String,
}

impl NameValue {
    pub fn new<N: Into<String>, V: Into<String>>(name: N, value: V) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Parse `name<sep>value`, trimming whitespace around the value
    pub fn parse_with(input: &str, separator: char) -> Result<Self> {
        match input.split_once(separator) {
            Some((name, value)) if !name.trim().is_empty() => {
                Ok(Self::new(name.trim(), value.trim()))
            }
            _ => Err(AppError::parse(format!(
                "expected '<name>{}<value>', got '{}'",
                separator, input
            ))),
        }
    }
}

impl FromStr for NameValue {
    type Err = AppError;

    /// Parses `name=value`
    fn from_str(s: &str) -> Result<Self> {
        Self::parse_with(s, '=')
    }
}
