//! Web client driving one measured HTTP transaction at a time

pub mod connection;
pub mod tls;

use crate::{
    defaults,
    dns::{join_host_port, Resolver},
    error::{AppError, Result},
    logging::{Logger, NetworkLogger},
    models::{HttpMeasure, PingConfig, RuntimeConfig},
    trace::{ConnectionTracer, RequestTracer, TraceEvent},
};
use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use connection::{ConnKey, Connection};
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::{Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Empty};
use hyper::body::Incoming;
use reqwest::cookie::{CookieStore, Jar};
use std::sync::Arc;
use url::Url;

/// Something that can run one measurement at a time
#[async_trait]
pub trait Measurer: Send {
    /// Run one transaction and report its phases; failures are data, not errors
    async fn do_measure(&mut self, follow_redirects: bool) -> HttpMeasure;

    /// URL the next measurement will hit
    fn url(&self) -> String;
}

/// The URL being pinged and the address dialed for it
///
/// Both are replaced together when a redirect is adopted.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Target {
    url: Url,
    connect_target: String,
}

impl Target {
    fn new(url: Url, conn_override: Option<&str>) -> Result<Self> {
        let connect_target = match conn_override {
            Some(target) => target.to_string(),
            None => {
                let port = url
                    .port_or_known_default()
                    .ok_or_else(|| AppError::config(format!("No port known for {}", url)))?;
                join_host_port(&plain_host(&url)?, port)
            }
        };
        Ok(Self { url, connect_target })
    }
}

/// The URL host without IPv6 brackets
fn plain_host(url: &Url) -> Result<String> {
    match url.host() {
        Some(url::Host::Ipv6(ip)) => Ok(ip.to_string()),
        Some(host) => Ok(host.to_string()),
        None => Err(AppError::config(format!("URL has no host: {}", url))),
    }
}

/// HTTP/S client instrumented for latency analysis
///
/// Keeps at most one idle connection, reused across rounds when keep-alive
/// is enabled and the next request goes to the same place.
pub struct WebClient {
    config: PingConfig,
    runtime: RuntimeConfig,
    method: Method,
    target: Target,
    resolver: Resolver,
    tls: Arc<rustls::ClientConfig>,
    connection: Option<Connection>,
    jar: Option<Arc<Jar>>,
    logger: NetworkLogger,
}

impl std::fmt::Debug for WebClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebClient")
            .field("target", &self.target)
            .field("method", &self.method)
            .field("connection", &self.connection)
            .finish()
    }
}

impl WebClient {
    /// Build a client for the configured target
    ///
    /// Fails on an unusable URL or method, or when the configured DNS server
    /// cannot be located.
    pub async fn new(config: PingConfig, runtime: RuntimeConfig) -> Result<Self> {
        let url = Url::parse(&config.target)
            .map_err(|e| AppError::config(format!("Invalid target URL '{}': {}", config.target, e)))?;
        let target = Target::new(url, config.conn_target.as_deref())?;
        let method = Method::from_bytes(config.method.to_uppercase().as_bytes())
            .map_err(|_| AppError::config(format!("Invalid HTTP method: '{}'", config.method)))?;

        let resolver = Resolver::new(&config).await?;
        let tls = tls::client_config(!config.no_check_certificate, !config.disable_http2)?;
        let logger = NetworkLogger::new(Logger::with_level("HTTP", config.log_level));

        Ok(Self {
            config,
            runtime,
            method,
            target,
            resolver,
            tls,
            connection: None,
            jar: None,
            logger,
        })
    }

    /// Report through the given logger instead of a private one
    pub fn with_logger(mut self, logger: &Logger) -> Self {
        self.logger = NetworkLogger::new(logger.named("HTTP"));
        self
    }

    pub fn connect_target(&self) -> &str {
        &self.target.connect_target
    }

    fn conn_key(&self) -> Result<ConnKey> {
        Ok(ConnKey {
            scheme: self.target.url.scheme().to_string(),
            target: self.target.connect_target.clone(),
            host: plain_host(&self.target.url)?,
        })
    }

    /// Header value overriding the request host, if configured
    fn host_override(&self) -> Option<&str> {
        self.config
            .headers
            .iter()
            .rev()
            .find(|h| h.name.eq_ignore_ascii_case("host"))
            .map(|h| h.value.as_str())
    }

    /// A fresh cookie jar per call, unless cookies are kept across calls
    fn cookie_jar(&mut self) -> Arc<Jar> {
        if let (Some(jar), true) = (&self.jar, self.config.keep_cookies) {
            return jar.clone();
        }

        let jar = Arc::new(Jar::default());
        for cookie in &self.config.cookies {
            jar.add_cookie_str(&format!("{}={}", cookie.name, cookie.value), &self.target.url);
        }
        self.jar = Some(jar.clone());
        jar
    }

    /// Get a connection for the current target: the pooled one if usable,
    /// otherwise resolve and dial
    async fn acquire(&mut self, request: &Arc<RequestTracer>, tracer: &Arc<ConnectionTracer>) -> Result<()> {
        request.on_event(TraceEvent::GetConn);
        let key = self.conn_key()?;

        if self.config.keep_alive {
            if let Some(conn) = self.connection.as_mut() {
                if conn.key() == &key && conn.ready().await {
                    conn.trace().attach(tracer.clone());
                    let remote = conn.remote_addr().to_string();
                    self.logger.log_connection(&remote, true, None).await;
                    request.on_event(TraceEvent::GotConn { reused: true, remote });
                    return Ok(());
                }
            }
        }
        self.connection = None;

        let addr = if self.config.conn_target.is_some() {
            self.target.connect_target.clone()
        } else {
            request.on_event(TraceEvent::DnsStart);
            let resolved = self.resolver.resolve_conn(&self.target.connect_target).await;
            self.logger
                .log_dns_resolution(&self.target.connect_target, &self.resolver.mode_name(), &resolved)
                .await;
            let resolved = resolved?;
            request.on_event(TraceEvent::DnsDone);
            resolved
        };

        let tls = (self.target.url.scheme() == "https").then(|| self.tls.clone());
        let opened = Connection::open(key, &addr, tls, tracer.clone(), request).await;
        self.logger.log_connection(&addr, false, opened.as_ref().err()).await;
        let conn = opened?;

        request.on_event(TraceEvent::GotConn {
            reused: false,
            remote: conn.remote_addr().to_string(),
        });
        self.connection = Some(conn);
        Ok(())
    }

    fn build_request(&self, method: &Method, http2: bool, jar: &Jar) -> Result<Request<Empty<Bytes>>> {
        let mut url = self.target.url.clone();
        if !self.config.parameters.is_empty() || self.config.extra_parameter {
            let mut pairs = url.query_pairs_mut();
            if self.config.extra_parameter {
                pairs.append_pair(
                    defaults::NONCE_PARAMETER,
                    &chrono::Utc::now().timestamp_micros().to_string(),
                );
            }
            for parameter in &self.config.parameters {
                pairs.append_pair(&parameter.name, &parameter.value);
            }
        }

        let authority = match self.host_override() {
            Some(host) => host.to_string(),
            None => url[url::Position::BeforeHost..url::Position::AfterPort].to_string(),
        };
        let path = &url[url::Position::BeforePath..url::Position::AfterQuery];

        let uri = if http2 {
            format!("{}://{}{}", url.scheme(), authority, path)
        } else {
            path.to_string()
        };

        let mut headers = HeaderMap::new();
        if !http2 {
            headers.insert(header::HOST, HeaderValue::from_str(&authority)?);
        }
        headers.insert(header::USER_AGENT, HeaderValue::from_str(&self.config.user_agent)?);
        if let Some(referrer) = &self.config.referrer {
            headers.insert(header::REFERER, HeaderValue::from_str(referrer)?);
        }
        if self.config.has_credentials() {
            let credentials = format!(
                "{}:{}",
                self.config.auth_username.as_deref().unwrap_or_default(),
                self.config.auth_password.as_deref().unwrap_or_default()
            );
            let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);
            headers.insert(header::AUTHORIZATION, HeaderValue::from_str(&format!("Basic {}", encoded))?);
        }
        if !self.config.disable_compression {
            headers.insert(header::ACCEPT_ENCODING, HeaderValue::from_static("gzip"));
        }
        if let Some(cookies) = jar.cookies(&url) {
            headers.insert(header::COOKIE, cookies);
        }
        if !self.config.keep_alive && !http2 {
            headers.insert(header::CONNECTION, HeaderValue::from_static("close"));
        }

        for extra in &self.config.headers {
            if extra.name.eq_ignore_ascii_case("host") {
                continue;
            }
            headers.insert(
                HeaderName::from_bytes(extra.name.as_bytes())?,
                HeaderValue::from_str(&extra.value)?,
            );
        }

        let mut request = Request::builder().method(method.clone()).uri(uri).body(Empty::new())?;
        *request.headers_mut() = headers;
        Ok(request)
    }

    /// Adopt the redirect target, replacing URL and dial target together
    fn adopt_redirect(&mut self, next: Url) -> Result<()> {
        self.target = Target::new(next, self.config.conn_target.as_deref())?;
        self.config.target = self.target.url.to_string();

        if let Some(callback) = &self.runtime.redirect_callback {
            callback(self.target.url.as_str());
        }
        Ok(())
    }

    /// Run the transaction, following redirects when asked to
    async fn exchange(&mut self, follow_redirects: bool, request: &Arc<RequestTracer>) -> Result<HttpMeasure> {
        let tracer = Arc::new(ConnectionTracer::new(request.clone()));
        let jar = self.cookie_jar();
        let mut method = self.method.clone();
        let mut redirects = 0;

        let response = loop {
            self.acquire(request, &tracer).await?;
            let conn = self
                .connection
                .as_mut()
                .ok_or_else(|| AppError::internal("connection missing after acquire"))?;
            let http2 = conn.is_http2();

            let outgoing = self.build_request(&method, http2, &jar)?;
            let conn = self
                .connection
                .as_mut()
                .ok_or_else(|| AppError::internal("connection missing after acquire"))?;
            let response = conn.send(outgoing).await?;
            request.on_event(TraceEvent::FirstResponseByte);

            let url = self.target.url.clone();
            jar.set_cookies(&mut response.headers().get_all(header::SET_COOKIE).iter(), &url);

            let location = response
                .headers()
                .get(header::LOCATION)
                .and_then(|l| l.to_str().ok())
                .map(str::to_string);

            match location {
                Some(location) if follow_redirects && response.status().is_redirection() => {
                    redirects += 1;
                    if redirects > defaults::MAX_REDIRECTS {
                        return Err(AppError::http(format!("stopped after {} redirects", defaults::MAX_REDIRECTS)));
                    }

                    let status = response.status();
                    // the redirect body is not part of the measurement, but a
                    // connection whose body could not be read is not reused
                    if response.into_body().collect().await.is_err() {
                        self.connection = None;
                    }

                    if matches!(
                        status,
                        StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND | StatusCode::SEE_OTHER
                    ) && method != Method::GET
                        && method != Method::HEAD
                    {
                        method = Method::GET;
                    }

                    let next = url.join(&location)?;
                    self.adopt_redirect(next)?;
                    self.logger.log_redirect(url.as_str(), self.target.url.as_str()).await;
                }
                _ => break response,
            }
        };

        self.complete(response, request, &tracer).await
    }

    /// Drain the body and assemble the measurement
    async fn complete(
        &mut self,
        response: Response<Incoming>,
        request: &Arc<RequestTracer>,
        tracer: &Arc<ConnectionTracer>,
    ) -> Result<HttpMeasure> {
        let status = response.status();
        let proto = format!("{:?}", response.version());
        let compressed = response
            .headers()
            .get(header::CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .map(|v| !v.trim().is_empty() && !v.eq_ignore_ascii_case("identity"))
            .unwrap_or(false);

        let (parts, mut body) = response.into_parts();
        let mut bytes = 0u64;
        while let Some(frame) = body.frame().await {
            match frame {
                Ok(frame) => {
                    if let Some(data) = frame.data_ref() {
                        bytes += data.len() as u64;
                    }
                }
                Err(_) => {
                    self.connection = None;
                    return Ok(HttpMeasure::failure("I/O error while reading payload"));
                }
            }
        }
        request.on_event(TraceEvent::BodyDone);
        let summary = request.finish();
        let (in_bytes, out_bytes) = tracer.take_counts();

        let tls_version = match self.connection.as_ref() {
            Some(conn) => {
                conn.trace().detach();
                conn.tls_version().map(str::to_string)
            }
            None => None,
        };
        if !self.config.keep_alive {
            self.connection = None;
        }

        let (is_failure, failure_cause) = if status.is_server_error() && !self.config.ignore_server_errors {
            (true, "Server-side error".to_string())
        } else {
            (false, String::new())
        };

        Ok(HttpMeasure {
            proto,
            status_code: status.as_u16(),
            bytes,
            in_bytes,
            out_bytes,
            socket_reused: summary.reused,
            compressed,
            remote_addr: summary.remote_addr,
            tls_enabled: tls_version.is_some(),
            tls_version: tls_version.unwrap_or_default(),
            total_time: summary.total,
            dns_resolution: summary.dns,
            tcp_handshake: summary.tcp,
            tls_duration: summary.tls,
            conn_establishment: summary.conn,
            request_sending: summary.request,
            wait: summary.wait,
            response_ingesting: summary.response,
            is_failure,
            failure_cause,
            headers: parts.headers,
        })
    }
}

#[async_trait]
impl Measurer for WebClient {
    async fn do_measure(&mut self, follow_redirects: bool) -> HttpMeasure {
        let request = Arc::new(RequestTracer::new());
        request.start();

        let outcome = tokio::time::timeout(self.config.wait, self.exchange(follow_redirects, &request)).await;
        let measure = match outcome {
            Ok(Ok(measure)) => measure,
            Ok(Err(e)) => {
                self.connection = None;
                HttpMeasure::failure(e.to_string())
            }
            Err(_) => {
                self.connection = None;
                HttpMeasure::failure("Request timeout")
            }
        };

        self.logger
            .log_measure(self.target.url.as_str(), self.method.as_str(), &measure)
            .await;
        measure
    }

    fn url(&self) -> String {
        self.target.url.to_string()
    }
}
