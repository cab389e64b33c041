//! HTTP Pinger
//!
//! Measures end-to-end and per-phase latency of HTTP/S transactions, the way
//! `ping` does for ICMP: DNS resolution, TCP and TLS setup, request sending,
//! server wait and response ingestion, repeated at a fixed interval.

pub mod cli;
pub mod client;
pub mod config;
pub mod dns;
pub mod error;
pub mod logging;
pub mod models;
pub mod output;
pub mod pinger;
pub mod stats;
pub mod trace;
pub mod types;

// Re-export commonly used types
pub use client::{Measurer, WebClient};
pub use dns::Resolver;
pub use error::{AppError, Result};
pub use models::{HttpMeasure, Measure, PingConfig, RuntimeConfig};
pub use pinger::{PingRun, Pinger};
pub use stats::PingStatistics;

/// Application version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");

/// Default configuration values
pub mod defaults {
    use std::time::Duration;

    pub const DEFAULT_METHOD: &str = "GET";
    pub const DEFAULT_WAIT: Duration = Duration::from_secs(10);
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);
    pub const DEFAULT_USER_AGENT: &str = concat!("http-ping/", env!("CARGO_PKG_VERSION"));
    /// Query parameter carrying the cache-defeating nonce
    pub const NONCE_PARAMETER: &str = "extra_parameter_http_ping";
    pub const MAX_REDIRECTS: usize = 10;
    pub const DNS_PORT: u16 = 53;
}
