use super::request::{RequestTracer, TraceEvent};
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Socket-level instrumentation bound to one connection for one transaction
///
/// Byte counters may be bumped from the connection task while the request
/// driver reads them, hence the atomics.
#[derive(Debug)]
pub struct ConnectionTracer {
    reads: AtomicU64,
    writes: AtomicU64,
    request: Arc<RequestTracer>,
}

impl ConnectionTracer {
    pub fn new(request: Arc<RequestTracer>) -> Self {
        Self {
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            request,
        }
    }

    pub fn connect_started(&self) {
        self.request.on_event(TraceEvent::ConnectStart);
    }

    pub fn connect_established(&self) {
        self.request.on_event(TraceEvent::ConnectDone);
    }

    /// Count socket input; phase boundaries come from the HTTP layer since
    /// TLS records such as session tickets arrive while the server thinks
    pub fn bytes_read(&self, n: usize) {
        self.reads.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, n: usize) {
        self.writes.fetch_add(n as u64, Ordering::Relaxed);
        self.request.on_event(TraceEvent::BytesWritten(n));
    }

    /// Read and reset the counters, returning `(in_bytes, out_bytes)`
    pub fn take_counts(&self) -> (u64, u64) {
        (
            self.reads.swap(0, Ordering::AcqRel),
            self.writes.swap(0, Ordering::AcqRel),
        )
    }
}

/// Slot through which a long-lived socket reports to the current transaction
///
/// A pooled connection outlives transactions; each transaction attaches its
/// own tracer and detaches it when done, so traffic is never charged to the
/// wrong measurement.
#[derive(Debug, Clone, Default)]
pub struct TraceHandle {
    slot: Arc<Mutex<Option<Arc<ConnectionTracer>>>>,
}

impl TraceHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, tracer: Arc<ConnectionTracer>) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = Some(tracer);
        }
    }

    pub fn detach(&self) -> Option<Arc<ConnectionTracer>> {
        self.slot.lock().ok().and_then(|mut slot| slot.take())
    }

    pub fn current(&self) -> Option<Arc<ConnectionTracer>> {
        self.slot.lock().ok().and_then(|slot| slot.clone())
    }
}

/// Stream wrapper reporting every read and write to the attached tracer
#[derive(Debug)]
pub struct TracedStream<S> {
    inner: S,
    handle: TraceHandle,
}

impl<S> TracedStream<S> {
    pub fn new(inner: S, handle: TraceHandle) -> Self {
        Self { inner, handle }
    }

}

impl<S: AsyncRead + Unpin> AsyncRead for TracedStream<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        let poll = Pin::new(&mut self.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = poll {
            let n = buf.filled().len() - before;
            if n > 0 {
                if let Some(tracer) = self.handle.current() {
                    tracer.bytes_read(n);
                }
            }
        }
        poll
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for TracedStream<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let poll = Pin::new(&mut self.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = poll {
            if let Some(tracer) = self.handle.current() {
                tracer.bytes_written(n);
            }
        }
        poll
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}
