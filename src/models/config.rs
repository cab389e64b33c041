//! Configuration data model and validation

use crate::logging::LogLevel;
use crate::types::{AppError, DnsMode, IpFamily, NameValue, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Everything a ping run needs to know about what to measure and how
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingConfig {
    /// Target URL
    pub target: String,

    /// HTTP method
    #[serde(default = "default_method")]
    pub method: String,

    /// IP family used for resolution and dialing
    #[serde(default)]
    pub ip_family: IpFamily,

    /// Overall timeout of one measurement (resolution through body drain)
    #[serde(default = "default_wait")]
    pub wait: Duration,

    /// Delay between two rounds
    #[serde(default = "default_interval")]
    pub interval: Duration,

    /// Number of reported rounds; `None` runs until stopped
    #[serde(default)]
    pub count: Option<u64>,

    /// Reuse connections across rounds
    #[serde(default = "default_true")]
    pub keep_alive: bool,

    /// Follow redirects during the warm-up request
    #[serde(default)]
    pub follow_redirects: bool,

    /// Literal `host:port` to dial instead of resolving the URL host
    #[serde(default)]
    pub conn_target: Option<String>,

    /// Name resolution strategy
    #[serde(default)]
    pub dns: DnsMode,

    /// Memoize resolved addresses for the lifetime of the client
    #[serde(default)]
    pub cache_dns: bool,

    /// Accept any server certificate
    #[serde(default)]
    pub no_check_certificate: bool,

    #[serde(default)]
    pub disable_compression: bool,

    #[serde(default)]
    pub disable_http2: bool,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default)]
    pub referrer: Option<String>,

    #[serde(default)]
    pub auth_username: Option<String>,

    #[serde(default)]
    pub auth_password: Option<String>,

    /// Extra headers; a header named `Host` overrides the request host
    #[serde(default)]
    pub headers: Vec<NameValue>,

    /// Extra query parameters
    #[serde(default)]
    pub parameters: Vec<NameValue>,

    /// Cookies sent with every request
    #[serde(default)]
    pub cookies: Vec<NameValue>,

    /// Tag each request with a unique parameter to defeat caches
    #[serde(default)]
    pub extra_parameter: bool,

    /// Report 5xx responses as successes
    #[serde(default)]
    pub ignore_server_errors: bool,

    /// Keep the cookie jar across rounds
    #[serde(default)]
    pub keep_cookies: bool,

    /// Minimum level of diagnostic log entries
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,
}

impl Default for PingConfig {
    fn default() -> Self {
        Self {
            target: String::new(),
            method: default_method(),
            ip_family: IpFamily::Any,
            wait: default_wait(),
            interval: default_interval(),
            count: None,
            keep_alive: true,
            follow_redirects: false,
            conn_target: None,
            dns: DnsMode::System,
            cache_dns: false,
            no_check_certificate: false,
            disable_compression: false,
            disable_http2: false,
            user_agent: default_user_agent(),
            referrer: None,
            auth_username: None,
            auth_password: None,
            headers: Vec::new(),
            parameters: Vec::new(),
            cookies: Vec::new(),
            extra_parameter: false,
            ignore_server_errors: false,
            keep_cookies: false,
            log_level: default_log_level(),
        }
    }
}

impl PingConfig {
    /// Create a configuration for a target with default values
    pub fn new<S: Into<String>>(target: S) -> Self {
        Self {
            target: target.into(),
            ..Self::default()
        }
    }

    /// Whether basic-auth credentials are configured
    pub fn has_credentials(&self) -> bool {
        self.auth_username.is_some() || self.auth_password.is_some()
    }

    /// Validate the configuration and return the first problem found
    pub fn validate(&self) -> Result<()> {
        if self.target.is_empty() {
            return Err(AppError::config("Target URL cannot be empty"));
        }

        let url = url::Url::parse(&self.target)
            .map_err(|e| AppError::config(format!("Invalid target URL '{}': {}", self.target, e)))?;

        match url.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(AppError::config(format!("Unsupported URL scheme: {}", scheme)));
            }
        }

        if url.host_str().is_none() {
            return Err(AppError::config("Target URL must have a host"));
        }

        if self.method.is_empty() || http::Method::from_bytes(self.method.as_bytes()).is_err() {
            return Err(AppError::config(format!("Invalid HTTP method: '{}'", self.method)));
        }

        if self.wait.is_zero() {
            return Err(AppError::config("Wait time must be greater than 0"));
        }

        if self.interval.is_zero() {
            return Err(AppError::config("Interval must be greater than 0"));
        }

        if self.count == Some(0) {
            return Err(AppError::config("Count must be greater than 0"));
        }

        if let DnsMode::Server(server) = &self.dns {
            if server.trim().is_empty() {
                return Err(AppError::config("DNS server cannot be empty"));
            }
        }

        if let Some(target) = &self.conn_target {
            if crate::dns::split_host_port(target).is_err() {
                return Err(AppError::config(format!(
                    "Connect target must be host:port, got '{}'",
                    target
                )));
            }
        }

        Ok(())
    }
}

/// Callback fired when a redirect is adopted, with the new URL
pub type RedirectCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Hooks supplied by the caller at run time
#[derive(Clone, Default)]
pub struct RuntimeConfig {
    pub redirect_callback: Option<RedirectCallback>,
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the redirect-observed callback
    pub fn on_redirect<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.redirect_callback = Some(Arc::new(callback));
        self
    }
}

impl fmt::Debug for RuntimeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeConfig")
            .field("redirect_callback", &self.redirect_callback.is_some())
            .finish()
    }
}

// Default value functions for serde
fn default_method() -> String {
    crate::defaults::DEFAULT_METHOD.to_string()
}

fn default_wait() -> Duration {
    crate::defaults::DEFAULT_WAIT
}

fn default_interval() -> Duration {
    crate::defaults::DEFAULT_INTERVAL
}

fn default_user_agent() -> String {
    crate::defaults::DEFAULT_USER_AGENT.to_string()
}

fn default_log_level() -> LogLevel {
    LogLevel::Warn
}

fn default_true() -> bool {
    true
}
