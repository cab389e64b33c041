//! Transaction instrumentation
//!
//! A [`RequestTracer`] collects the lifecycle events of one HTTP transaction
//! and turns them into phase durations. A [`ConnectionTracer`] is attached to
//! the socket of that transaction through a [`TraceHandle`] and reports TCP
//! setup and byte-level traffic.

pub mod conn;
pub mod request;
pub mod timer;

pub use conn::{ConnectionTracer, TraceHandle, TracedStream};
pub use request::{RequestTracer, TraceEvent, TraceSummary};
pub use timer::PhaseTimer;
