use super::timer::PhaseTimer;
use crate::models::Measure;
use std::sync::{Mutex, MutexGuard};

/// Lifecycle transitions observed while executing one transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    DnsStart,
    DnsDone,
    ConnectStart,
    ConnectDone,
    TlsStart,
    TlsDone,
    /// The client starts looking for a connection
    GetConn,
    /// A connection is ready to carry the request
    GotConn { reused: bool, remote: String },
    BytesWritten(usize),
    /// The response head has been received
    FirstResponseByte,
    /// The response body has been fully drained
    BodyDone,
}

#[derive(Debug, Default)]
struct Phases {
    total: PhaseTimer,
    dns: PhaseTimer,
    tcp: PhaseTimer,
    tls: PhaseTimer,
    conn: PhaseTimer,
    request: PhaseTimer,
    wait: PhaseTimer,
    response: PhaseTimer,
    /// Set once the connection is handed to the request
    armed: bool,
    wrote_request: bool,
    first_byte: bool,
    reused: bool,
    remote_addr: String,
}

/// Per-transaction phase timings, as gathered by a [`RequestTracer`]
#[derive(Debug, Clone, Default)]
pub struct TraceSummary {
    pub total: Measure,
    pub dns: Measure,
    pub tcp: Measure,
    pub tls: Measure,
    pub conn: Measure,
    pub request: Measure,
    pub wait: Measure,
    pub response: Measure,
    pub reused: bool,
    pub remote_addr: String,
}

/// Turns lifecycle events into phase durations for one transaction
///
/// Shared between the request driver and the socket wrapper, which may
/// report bytes from a connection task, so the timers sit behind a mutex.
/// The lock is never held across an await point.
#[derive(Debug, Default)]
pub struct RequestTracer {
    phases: Mutex<Phases>,
}

impl RequestTracer {
    pub fn new() -> Self {
        Self::default()
    }

    fn phases(&self) -> MutexGuard<'_, Phases> {
        match self.phases.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Mark the beginning of the transaction
    pub fn start(&self) {
        self.phases().total.start();
    }

    pub fn on_event(&self, event: TraceEvent) {
        let mut p = self.phases();
        match event {
            TraceEvent::DnsStart => p.dns.start(),
            TraceEvent::DnsDone => p.dns.stop(),
            TraceEvent::ConnectStart => p.tcp.start(),
            TraceEvent::ConnectDone => p.tcp.stop(),
            TraceEvent::TlsStart => p.tls.start(),
            TraceEvent::TlsDone => p.tls.stop(),
            TraceEvent::GetConn => {
                p.conn.start();
                p.armed = false;
                p.wrote_request = false;
                p.first_byte = false;
            }
            TraceEvent::GotConn { reused, remote } => {
                p.conn.stop();
                p.request.start();
                p.armed = true;
                p.reused = reused;
                p.remote_addr = remote;
            }
            TraceEvent::BytesWritten(n) => {
                // later writes are connection control traffic, such as an
                // HTTP/2 SETTINGS ack, and must not restart the wait
                if n > 0 && p.armed && !p.wrote_request {
                    p.request.stop();
                    p.wait.start();
                    p.wrote_request = true;
                }
            }
            TraceEvent::FirstResponseByte => {
                if p.armed && !p.first_byte {
                    if p.wait.is_running() {
                        p.wait.stop();
                    } else {
                        p.request.stop();
                    }
                    p.response.start();
                    p.first_byte = true;
                }
            }
            TraceEvent::BodyDone => p.response.stop(),
        }
    }

    /// Close the transaction and collect the phase measures
    pub fn finish(&self) -> TraceSummary {
        let mut p = self.phases();
        p.total.stop();
        TraceSummary {
            total: p.total.measure(),
            dns: p.dns.measure(),
            tcp: p.tcp.measure(),
            tls: p.tls.measure(),
            conn: p.conn.measure(),
            request: p.request.measure(),
            wait: p.wait.measure(),
            response: p.response.measure(),
            reused: p.reused,
            remote_addr: p.remote_addr.clone(),
        }
    }
}
