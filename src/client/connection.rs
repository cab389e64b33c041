//! Dialing, TLS and HTTP handshakes for one traced connection

use super::tls::version_label;
use crate::error::{AppError, Result};
use crate::trace::{ConnectionTracer, RequestTracer, TraceEvent, TraceHandle, TracedStream};
use bytes::Bytes;
use http::{Request, Response};
use http_body_util::Empty;
use hyper::body::Incoming;
use hyper::client::conn::{http1, http2};
use hyper_util::rt::{TokioExecutor, TokioIo};
use rustls::pki_types::ServerName;
use rustls::ClientConfig;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_rustls::TlsConnector;

/// What a pooled connection may be reused for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnKey {
    pub scheme: String,
    /// Address dialed, before resolution
    pub target: String,
    /// Host the request is addressed to (SNI for TLS)
    pub host: String,
}

enum Sender {
    Http1(http1::SendRequest<Empty<Bytes>>),
    Http2(http2::SendRequest<Empty<Bytes>>),
}

/// An established HTTP connection whose socket reports to a [`TraceHandle`]
pub struct Connection {
    key: ConnKey,
    sender: Sender,
    trace: TraceHandle,
    remote_addr: String,
    tls_version: Option<String>,
    driver: JoinHandle<()>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("key", &self.key)
            .field("remote_addr", &self.remote_addr)
            .field("http2", &self.is_http2())
            .field("tls_version", &self.tls_version)
            .finish()
    }
}

impl Connection {
    /// Dial `addr` (a resolved `ip:port`), negotiate TLS when a configuration
    /// is given, and perform the HTTP handshake
    pub async fn open(
        key: ConnKey,
        addr: &str,
        tls: Option<Arc<ClientConfig>>,
        tracer: Arc<ConnectionTracer>,
        request: &RequestTracer,
    ) -> Result<Self> {
        tracer.connect_started();
        let tcp = TcpStream::connect(addr)
            .await
            .map_err(|e| AppError::connect(format!("dial tcp {}: {}", addr, e)))?;
        tracer.connect_established();

        let _ = tcp.set_nodelay(true);
        let remote_addr = tcp
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| addr.to_string());

        let trace = TraceHandle::new();
        trace.attach(tracer);
        let stream = TracedStream::new(tcp, trace.clone());

        let (sender, driver, tls_version) = match tls {
            None => {
                let (sender, driver) = handshake(stream, false).await?;
                (sender, driver, None)
            }
            Some(config) => {
                let server_name = ServerName::try_from(key.host.clone())
                    .map_err(|e| AppError::tls(format!("invalid server name {}: {}", key.host, e)))?;

                request.on_event(TraceEvent::TlsStart);
                let tls_stream = TlsConnector::from(config)
                    .connect(server_name, stream)
                    .await
                    .map_err(|e| AppError::tls(e.to_string()))?;
                request.on_event(TraceEvent::TlsDone);

                let session = tls_stream.get_ref().1;
                let version = session.protocol_version().map(version_label);
                let h2 = session.alpn_protocol() == Some(b"h2".as_slice());

                let (sender, driver) = handshake(tls_stream, h2).await?;
                (sender, driver, version)
            }
        };

        Ok(Self {
            key,
            sender,
            trace,
            remote_addr,
            tls_version,
            driver,
        })
    }

    pub fn key(&self) -> &ConnKey {
        &self.key
    }

    pub fn remote_addr(&self) -> &str {
        &self.remote_addr
    }

    pub fn tls_version(&self) -> Option<&str> {
        self.tls_version.as_deref()
    }

    pub fn is_http2(&self) -> bool {
        matches!(self.sender, Sender::Http2(_))
    }

    pub fn trace(&self) -> &TraceHandle {
        &self.trace
    }

    /// Whether the connection can take another request right now
    pub async fn ready(&mut self) -> bool {
        match &mut self.sender {
            Sender::Http1(sender) => !sender.is_closed() && sender.ready().await.is_ok(),
            Sender::Http2(sender) => !sender.is_closed() && sender.ready().await.is_ok(),
        }
    }

    pub async fn send(&mut self, request: Request<Empty<Bytes>>) -> Result<Response<Incoming>> {
        let response = match &mut self.sender {
            Sender::Http1(sender) => {
                sender.ready().await?;
                sender.send_request(request).await?
            }
            Sender::Http2(sender) => {
                sender.ready().await?;
                sender.send_request(request).await?
            }
        };
        Ok(response)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

async fn handshake<T>(io: T, h2: bool) -> Result<(Sender, JoinHandle<()>)>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let io = TokioIo::new(io);
    if h2 {
        let (sender, conn) = http2::handshake(TokioExecutor::new(), io).await?;
        let driver = tokio::spawn(async move {
            let _ = conn.await;
        });
        Ok((Sender::Http2(sender), driver))
    } else {
        let (sender, conn) = http1::handshake(io).await?;
        let driver = tokio::spawn(async move {
            let _ = conn.await;
        });
        Ok((Sender::Http1(sender), driver))
    }
}
