//! Error handling for the HTTP pinger

use thiserror::Error;

/// Error types surfaced by the pinger
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Parsing errors (URLs, addresses, DNS messages, etc.)
    #[error("Parsing error: {0}")]
    Parse(String),

    /// DNS resolution errors
    #[error("DNS resolution error: {0}")]
    DnsResolution(String),

    /// TCP connection errors
    #[error("Connection error: {0}")]
    Connect(String),

    /// TLS negotiation errors
    #[error("TLS error: {0}")]
    Tls(String),

    /// HTTP protocol errors
    #[error("HTTP error: {0}")]
    Http(String),

    /// Timeout errors
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// Failure while reading a response body after the headers arrived
    #[error("Payload error: {0}")]
    Payload(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation(message.into())
    }

    /// Create a new parsing error
    pub fn parse<S: Into<String>>(message: S) -> Self {
        Self::Parse(message.into())
    }

    /// Create a new DNS resolution error
    pub fn dns_resolution<S: Into<String>>(message: S) -> Self {
        Self::DnsResolution(message.into())
    }

    /// The name has no address of the requested family
    pub fn no_such_host(host: &str) -> Self {
        Self::DnsResolution(format!("lookup {}: no such host", host))
    }

    /// Create a new connection error
    pub fn connect<S: Into<String>>(message: S) -> Self {
        Self::Connect(message.into())
    }

    /// Create a new TLS error
    pub fn tls<S: Into<String>>(message: S) -> Self {
        Self::Tls(message.into())
    }

    /// Create a new HTTP error
    pub fn http<S: Into<String>>(message: S) -> Self {
        Self::Http(message.into())
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        Self::Timeout(message.into())
    }

    /// Create a new payload error
    pub fn payload<S: Into<String>>(message: S) -> Self {
        Self::Payload(message.into())
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io(message.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// Whether this is a "no such host" resolution failure
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::DnsResolution(msg) if msg.ends_with("no such host"))
    }

    /// Get error category for logging and reporting
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG",
            Self::Validation(_) => "VALIDATION",
            Self::Parse(_) => "PARSE",
            Self::DnsResolution(_) => "DNS",
            Self::Connect(_) => "CONNECT",
            Self::Tls(_) => "TLS",
            Self::Http(_) => "HTTP",
            Self::Timeout(_) => "TIMEOUT",
            Self::Payload(_) => "PAYLOAD",
            Self::Io(_) => "IO",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Get exit code for this error type
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Validation(_) | Self::Parse(_) => 1,
            Self::DnsResolution(_) | Self::Connect(_) | Self::Tls(_) | Self::Http(_) => 2,
            Self::Timeout(_) => 3,
            Self::Payload(_) | Self::Io(_) => 5,
            Self::Internal(_) => 99,
        }
    }

    /// Format error for console display with color coding
    pub fn format_for_console(&self, use_color: bool) -> String {
        let category = self.category();
        let message = self.to_string();

        if use_color {
            use colored::Colorize;
            match self {
                Self::Config(_) | Self::Validation(_) | Self::Parse(_) => {
                    format!("[{}] {}", category.red().bold(), message.red())
                }
                Self::Timeout(_) => format!("[{}] {}", category.blue().bold(), message.blue()),
                Self::Internal(_) => {
                    format!("[{}] {}", category.bright_red().bold(), message.bright_red())
                }
                _ => format!("[{}] {}", category.yellow().bold(), message.yellow()),
            }
        } else {
            format!("[{}] {}", category, message)
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::io(error.to_string())
    }
}

impl From<url::ParseError> for AppError {
    fn from(error: url::ParseError) -> Self {
        Self::parse(format!("URL parse error: {}", error))
    }
}

impl From<std::net::AddrParseError> for AppError {
    fn from(error: std::net::AddrParseError) -> Self {
        Self::parse(format!("IP address parse error: {}", error))
    }
}

impl From<hyper::Error> for AppError {
    fn from(error: hyper::Error) -> Self {
        if error.is_timeout() {
            Self::timeout(error.to_string())
        } else {
            Self::http(error.to_string())
        }
    }
}

impl From<http::Error> for AppError {
    fn from(error: http::Error) -> Self {
        Self::http(error.to_string())
    }
}

impl From<http::header::InvalidHeaderValue> for AppError {
    fn from(error: http::header::InvalidHeaderValue) -> Self {
        Self::validation(format!("invalid header value: {}", error))
    }
}

impl From<http::header::InvalidHeaderName> for AppError {
    fn from(error: http::header::InvalidHeaderName) -> Self {
        Self::validation(format!("invalid header name: {}", error))
    }
}

impl From<trust_dns_resolver::error::ResolveError> for AppError {
    fn from(error: trust_dns_resolver::error::ResolveError) -> Self {
        Self::dns_resolution(error.to_string())
    }
}

impl From<trust_dns_resolver::proto::error::ProtoError> for AppError {
    fn from(error: trust_dns_resolver::proto::error::ProtoError) -> Self {
        Self::dns_resolution(error.to_string())
    }
}

impl From<rustls::Error> for AppError {
    fn from(error: rustls::Error) -> Self {
        Self::tls(error.to_string())
    }
}

impl From<dotenv::Error> for AppError {
    fn from(error: dotenv::Error) -> Self {
        Self::config(format!("Environment file error: {}", error))
    }
}

/// Custom Result type for the application
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert_eq!(AppError::config("x").category(), "CONFIG");
        assert_eq!(AppError::dns_resolution("x").category(), "DNS");
        assert_eq!(AppError::payload("x").category(), "PAYLOAD");
        assert_eq!(AppError::tls("x").category(), "TLS");
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(AppError::config("x").exit_code(), 1);
        assert_eq!(AppError::parse("x").exit_code(), 1);
        assert_eq!(AppError::connect("x").exit_code(), 2);
        assert_eq!(AppError::timeout("x").exit_code(), 3);
        assert_eq!(AppError::internal("x").exit_code(), 99);
    }

    #[test]
    fn test_no_such_host() {
        let error = AppError::no_such_host("missing.example");
        assert!(error.is_not_found());
        assert_eq!(
            error.to_string(),
            "DNS resolution error: lookup missing.example: no such host"
        );
        assert!(!AppError::dns_resolution("server refused").is_not_found());
    }

    #[test]
    fn test_url_error_conversion() {
        let error: AppError = url::Url::parse("not a url").unwrap_err().into();
        assert!(matches!(error, AppError::Parse(_)));
    }

    #[test]
    fn test_console_format_without_color() {
        let formatted = AppError::timeout("slow").format_for_console(false);
        assert_eq!(formatted, "[TIMEOUT] Timeout error: slow");
    }
}
