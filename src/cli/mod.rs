//! Command-line interface

use crate::defaults;
use crate::logging::LogLevel;
use crate::output::Verbosity;
use crate::types::NameValue;
use clap::{ArgAction, Parser};
use std::time::Duration;

/// HTTP-Ping - measure HTTP/S latency phase by phase, like ping does for ICMP
#[derive(Parser, Debug, Clone)]
#[command(name = "http-ping")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Target URL
    #[arg(env = "HTTP_PING_TARGET")]
    pub target: String,

    /// HTTP method
    #[arg(short = 'X', long, default_value = defaults::DEFAULT_METHOD, env = "HTTP_PING_METHOD")]
    pub method: String,

    /// Number of requests to send; 0 runs until interrupted
    #[arg(short, long, default_value_t = 10, env = "HTTP_PING_COUNT")]
    pub count: u64,

    /// Wait between requests, in seconds
    #[arg(short, long, value_parser = parse_seconds, default_value = "1", env = "HTTP_PING_INTERVAL")]
    pub interval: Duration,

    /// Time to wait for one full request and response, in seconds
    #[arg(short, long, value_parser = parse_seconds, default_value = "10", env = "HTTP_PING_WAIT")]
    pub wait: Duration,

    /// Use IPv4 only
    #[arg(short = '4', long = "ipv4", conflicts_with = "ipv6")]
    pub ipv4: bool,

    /// Use IPv6 only
    #[arg(short = '6', long = "ipv6")]
    pub ipv6: bool,

    /// Accept invalid server certificates
    #[arg(short = 'k', long)]
    pub insecure: bool,

    /// Open a new connection for every request
    #[arg(short = 'K', long = "disable-keepalive")]
    pub disable_keepalive: bool,

    /// Follow redirects during the warm-up request
    #[arg(short = 'F', long)]
    pub follow_redirects: bool,

    /// Connect to this host:port instead of resolving the URL host
    #[arg(long, value_name = "HOST:PORT")]
    pub conn_target: Option<String>,

    /// Resolve names with this DNS server
    #[arg(long, value_name = "SERVER", env = "HTTP_PING_DNS_SERVER", conflicts_with = "dns_full_resolution")]
    pub dns_server: Option<String>,

    /// Resolve names iteratively from the root servers
    #[arg(long)]
    pub dns_full_resolution: bool,

    /// Cache DNS answers for the whole run
    #[arg(long)]
    pub dns_cache: bool,

    /// Do not ask for compressed responses
    #[arg(long)]
    pub disable_compression: bool,

    /// Stick to HTTP/1.1
    #[arg(long)]
    pub disable_http2: bool,

    /// User agent
    #[arg(long, default_value = defaults::DEFAULT_USER_AGENT, env = "HTTP_PING_USER_AGENT")]
    pub user_agent: String,

    /// Referrer
    #[arg(long)]
    pub referrer: Option<String>,

    /// Basic authentication user
    #[arg(long, env = "HTTP_PING_AUTH_USER")]
    pub auth_user: Option<String>,

    /// Basic authentication password
    #[arg(long, env = "HTTP_PING_AUTH_PASSWORD", hide_env_values = true)]
    pub auth_password: Option<String>,

    /// Extra header, `Name: value`; `Host` overrides the request host
    #[arg(short = 'H', long = "header", value_name = "NAME:VALUE", value_parser = parse_header, action = ArgAction::Append)]
    pub headers: Vec<NameValue>,

    /// Extra query parameter, `name=value`
    #[arg(short = 'P', long = "parameter", value_name = "NAME=VALUE", value_parser = parse_pair, action = ArgAction::Append)]
    pub parameters: Vec<NameValue>,

    /// Cookie, `name=value`
    #[arg(long = "cookie", value_name = "NAME=VALUE", value_parser = parse_pair, action = ArgAction::Append)]
    pub cookies: Vec<NameValue>,

    /// Add a unique parameter to every request to defeat caches
    #[arg(long)]
    pub extra_parameter: bool,

    /// Report 5xx answers as successes
    #[arg(long)]
    pub ignore_server_errors: bool,

    /// Keep cookies set by the server across requests
    #[arg(long)]
    pub keep_cookies: bool,

    /// Print the summary only
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Print protocol details and latency contributions
    #[arg(short, long)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Ring the terminal bell on every answer
    #[arg(long)]
    pub audible_bell: bool,
}

impl Cli {
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else if self.verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Normal
        }
    }

    pub fn log_level(&self) -> LogLevel {
        if self.debug {
            LogLevel::Debug
        } else {
            LogLevel::Warn
        }
    }

    /// Check if colors should be enabled
    pub fn use_colors(&self) -> bool {
        !self.no_color && supports_color()
    }
}

/// Parse a positive number of seconds, fractions allowed
fn parse_seconds(s: &str) -> Result<Duration, String> {
    if s.starts_with('+') {
        return Err(format!("Invalid duration: {}", s));
    }

    let secs = s
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("Invalid duration: {}", s))?;

    if !secs.is_finite() || secs <= 0.0 {
        return Err("Duration must be greater than 0".to_string());
    }
    Duration::try_from_secs_f64(secs).map_err(|_| format!("Invalid duration: {}", s))
}

fn parse_header(s: &str) -> Result<NameValue, String> {
    NameValue::parse_with(s, ':').map_err(|e| e.to_string())
}

fn parse_pair(s: &str) -> Result<NameValue, String> {
    NameValue::parse_with(s, '=').map_err(|e| e.to_string())
}

/// Check if the terminal supports color output
fn supports_color() -> bool {
    if let Ok(term) = std::env::var("TERM") {
        if term == "dumb" {
            return false;
        }
    }

    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }

    cfg!(unix) || std::env::var("FORCE_COLOR").is_ok()
}
