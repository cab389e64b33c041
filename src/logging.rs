//! Structured logging for the pinger
//!
//! Entries carry a timestamp, a level, the component that emitted them, an
//! optional correlation id and free-form structured fields. They are
//! rendered for humans on the console or as JSON lines for log aggregators.

use crate::error::{AppError, Result};
use crate::models::HttpMeasure;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Log level enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    /// Trace level - most detailed
    Trace = 0,
    /// Debug level - detailed information for debugging
    Debug = 1,
    /// Info level - general application information
    Info = 2,
    /// Warning level - potentially harmful situations
    Warn = 3,
    /// Error level - error events but application can continue
    Error = 4,
}

impl LogLevel {
    /// Get log level name as string
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "TRACE" => Ok(LogLevel::Trace),
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" | "WARNING" => Ok(LogLevel::Warn),
            "ERROR" => Ok(LogLevel::Error),
            _ => Err(AppError::parse(format!("Invalid log level: {}", s))),
        }
    }
}

/// Log entry structure for structured logging
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    /// Component that emitted the entry
    pub logger: String,
    /// Correlation ID for tracking related events
    pub correlation_id: Option<String>,
    pub fields: HashMap<String, serde_json::Value>,
}

/// Log output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable console format
    Console,
    /// JSON format for structured logging
    Json,
}

/// Correlation state shared by a logger and the loggers named from it
#[derive(Debug, Default)]
struct LogContext {
    current_correlation_id: Option<String>,
}

/// Logger implementation with multiple output formats
///
/// Clones share their correlation context.
#[derive(Debug, Clone)]
pub struct Logger {
    min_level: LogLevel,
    format: LogFormat,
    name: String,
    context: Arc<RwLock<LogContext>>,
}

impl Logger {
    /// Create a new logger that only reports warnings and above
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self::with_level(name, LogLevel::Warn)
    }

    /// Create a logger with a minimum level; debug and below use JSON
    pub fn with_level<S: Into<String>>(name: S, min_level: LogLevel) -> Self {
        Self {
            min_level,
            format: if min_level <= LogLevel::Debug { LogFormat::Json } else { LogFormat::Console },
            name: name.into(),
            context: Arc::new(RwLock::new(LogContext::default())),
        }
    }

    /// A logger for another component sharing this one's settings and context
    pub fn named<S: Into<String>>(&self, name: S) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }

    pub fn format(&self) -> LogFormat {
        self.format
    }

    /// Start a correlated operation
    pub async fn start_operation(&self, operation_name: &str) -> String {
        let correlation_id = Uuid::new_v4().to_string();
        {
            let mut context = self.context.write().await;
            context.current_correlation_id = Some(correlation_id.clone());
        }

        self.info(&format!("Started operation: {}", operation_name))
            .correlation_id(&correlation_id)
            .field("operation", operation_name)
            .field("operation_type", "start")
            .log()
            .await;

        correlation_id
    }

    /// End a correlated operation
    pub async fn end_operation(&self, correlation_id: &str, operation_name: &str, success: bool) {
        self.info(&format!("Completed operation: {} (success: {})", operation_name, success))
            .correlation_id(correlation_id)
            .field("operation", operation_name)
            .field("operation_type", "end")
            .field("success", success)
            .log()
            .await;

        let mut context = self.context.write().await;
        if context.current_correlation_id.as_deref() == Some(correlation_id) {
            context.current_correlation_id = None;
        }
    }

    /// Create a log entry builder
    pub fn log(&self, level: LogLevel, message: &str) -> LogEntryBuilder<'_> {
        LogEntryBuilder::new(self, level, message.to_string())
    }

    pub fn debug(&self, message: &str) -> LogEntryBuilder<'_> {
        self.log(LogLevel::Debug, message)
    }

    pub fn info(&self, message: &str) -> LogEntryBuilder<'_> {
        self.log(LogLevel::Info, message)
    }

    /// Check if a log level would be output
    pub fn would_log(&self, level: LogLevel) -> bool {
        level >= self.min_level
    }

    async fn write_entry(&self, mut entry: LogEntry) {
        if !self.would_log(entry.level) {
            return;
        }

        if entry.correlation_id.is_none() {
            entry.correlation_id = self.context.read().await.current_correlation_id.clone();
        }

        let output = self.render(&entry);

        // Write to stderr for errors/warnings, stdout for others
        if entry.level >= LogLevel::Warn {
            let _ = writeln!(io::stderr(), "{}", output);
        } else {
            let _ = writeln!(io::stdout(), "{}", output);
        }
    }

    fn render(&self, entry: &LogEntry) -> String {
        match self.format {
            LogFormat::Console => self.format_console(entry),
            LogFormat::Json => self.format_json(entry),
        }
    }

    fn format_console(&self, entry: &LogEntry) -> String {
        let timestamp = entry.timestamp.format("%Y-%m-%d %H:%M:%S%.3f");
        let mut output = format!(
            "{} {:>5} [{}] {}",
            timestamp,
            entry.level.as_str(),
            entry.logger,
            entry.message
        );

        if let Some(correlation_id) = &entry.correlation_id {
            let short = correlation_id.get(..8).unwrap_or(correlation_id);
            output.push_str(&format!(" [{}]", short));
        }

        if !entry.fields.is_empty() {
            let mut fields: Vec<String> = entry
                .fields
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            fields.sort();
            output.push_str(&format!(" {{{}}}", fields.join(", ")));
        }

        output
    }

    fn format_json(&self, entry: &LogEntry) -> String {
        match serde_json::to_string(entry) {
            Ok(json) => json,
            Err(_) => format!(
                "{{\"error\": \"Failed to serialize log entry\", \"message\": \"{}\"}}",
                entry.message
            ),
        }
    }
}

/// Builder pattern for creating log entries
pub struct LogEntryBuilder<'a> {
    logger: &'a Logger,
    entry: LogEntry,
}

impl<'a> LogEntryBuilder<'a> {
    fn new(logger: &'a Logger, level: LogLevel, message: String) -> Self {
        Self {
            logger,
            entry: LogEntry {
                timestamp: Utc::now(),
                level,
                message,
                logger: logger.name.clone(),
                correlation_id: None,
                fields: HashMap::new(),
            },
        }
    }

    pub fn correlation_id(mut self, id: &str) -> Self {
        self.entry.correlation_id = Some(id.to_string());
        self
    }

    /// Add a structured field
    pub fn field<T: Serialize>(mut self, key: &str, value: T) -> Self {
        if let Ok(json_value) = serde_json::to_value(value) {
            self.entry.fields.insert(key.to_string(), json_value);
        }
        self
    }

    /// Add the phase breakdown of a measurement
    pub fn measure(self, measure: &HttpMeasure) -> Self {
        self.field("status_code", measure.status_code)
            .field("bytes", measure.bytes)
            .field("socket_reused", measure.socket_reused)
            .field("total_ms", measure.total_time.as_millis_f64())
            .field("dns_ms", measure.dns_resolution.as_millis_f64())
            .field("tcp_ms", measure.tcp_handshake.as_millis_f64())
            .field("tls_ms", measure.tls_duration.as_millis_f64())
            .field("wait_ms", measure.wait.as_millis_f64())
    }

    /// Add error information
    pub fn error_info(self, error: &AppError) -> Self {
        self.field("error_category", error.category())
            .field("error_exit_code", error.exit_code())
    }

    /// Finalize and write the log entry
    pub async fn log(self) {
        self.logger.write_entry(self.entry).await;
    }
}

/// Specialized logger for resolution, connection and measurement events
#[derive(Debug, Clone)]
pub struct NetworkLogger {
    logger: Logger,
}

impl NetworkLogger {
    pub fn new(logger: Logger) -> Self {
        Self { logger }
    }

    /// Log DNS resolution attempt
    pub async fn log_dns_resolution<T: std::fmt::Display>(&self, host: &str, mode: &str, result: &Result<T>) {
        match result {
            Ok(address) => {
                self.logger
                    .debug(&format!("Resolved {} using {}: {}", host, mode, address))
                    .field("host", host)
                    .field("dns_mode", mode)
                    .field("address", address.to_string())
                    .log()
                    .await;
            }
            Err(e) => {
                // per-round failures are reported as measurements already
                self.logger
                    .info(&format!("Resolution of {} using {} failed: {}", host, mode, e))
                    .field("host", host)
                    .field("dns_mode", mode)
                    .error_info(e)
                    .log()
                    .await;
            }
        }
    }

    /// Log connection attempt
    pub async fn log_connection(&self, target: &str, reused: bool, error: Option<&AppError>) {
        let mut builder = match error {
            None => self
                .logger
                .debug(&format!("Connected to {}", target))
                .field("reused", reused),
            Some(e) => self
                .logger
                .info(&format!("Failed to connect to {}: {}", target, e))
                .error_info(e),
        };
        builder = builder.field("target", target);
        builder.log().await;
    }

    /// Log an adopted redirect
    pub async fn log_redirect(&self, from: &str, to: &str) {
        self.logger
            .info(&format!("Redirected from {} to {}", from, to))
            .field("from", from)
            .field("to", to)
            .log()
            .await;
    }

    /// Log the outcome of one measurement
    pub async fn log_measure(&self, url: &str, method: &str, measure: &HttpMeasure) {
        if measure.is_failure {
            self.logger
                .info(&format!("{} {} failed: {}", method, url, measure.failure_cause))
                .field("url", url)
                .field("method", method)
                .field("status_code", measure.status_code)
                .log()
                .await;
        } else {
            self.logger
                .debug(&format!("{} {} -> {} in {}", method, url, measure.status_code, measure.total_time))
                .field("url", url)
                .field("method", method)
                .measure(measure)
                .log()
                .await;
        }
    }
}
