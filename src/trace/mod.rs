//! Trace lifecycle interface and the crate's concrete trace record.
//!
//! A trace is the full record of one traced server-side RPC execution:
//! a root span covering the dispatch call plus an ordered sequence of
//! span-events bracketing the timed units of work inside it. This
//! module defines the [`Trace`] interface the interceptors drive, and
//! [`record::TraceRecord`] implements it for local collection.
//!
//! The lifecycle as the interceptors observe it is linear: an upstream
//! stage creates the trace and parks it in the invocation context, the
//! boundary stage removes it exactly once on exit, and, when sampled,
//! annotates and closes it exactly once. Unsampled traces skip the
//! annotation entirely and are discarded by dropping them.

use std::error::Error;

use crate::descriptor::MethodDescriptor;
use crate::error::TraceResult;

pub mod record;

pub use record::{SpanEvent, TraceData, TraceHandle, TraceRecord, TraceState};

/// Rpc name recorded when the method identity could not be resolved.
pub const UNKNOWN_METHOD_URI: &str = "/unknown";

/// One traced server-side RPC execution.
///
/// Annotation and lifecycle operations are driven by the interception
/// stages; implementations report failures through [`TraceResult`] and
/// callers at the boundary catch and log them rather than letting a
/// tracing failure alter the traced call's outcome.
pub trait Trace {
    /// `true` when this trace was selected for sampling; unsampled
    /// traces are never annotated.
    fn can_sample(&self) -> bool;

    /// Opens a span-event bracketing a unit of timed work.
    fn trace_block_begin(&mut self) -> TraceResult<()>;

    /// Closes the currently open span-event.
    fn trace_block_end(&mut self) -> TraceResult<()>;

    /// Attaches a terminal error marker to the current span-event.
    /// `None` is a no-op, not an error.
    fn record_exception(&mut self, error: Option<&(dyn Error + 'static)>) -> TraceResult<()>;

    /// Tags the current span-event with the static identity of the
    /// method being traced.
    fn record_api(&mut self, descriptor: &MethodDescriptor) -> TraceResult<()>;

    /// Stamps an end timestamp with the wall-clock time at call time.
    ///
    /// The stamp lands on the currently open span-event when one
    /// exists, otherwise on the root span. The boundary stage calls
    /// this twice on purpose: once before closing the span-event
    /// (operation-level timing) and once more after (the authoritative
    /// RPC-level timing on the root span).
    fn mark_after_time(&mut self) -> TraceResult<()>;

    /// Records the resolved rpc name on the root span.
    fn record_rpc_name(&mut self, rpc_name: &str) -> TraceResult<()>;

    /// Records the server's local `host:port` on the root span.
    fn record_end_point(&mut self, end_point: &str) -> TraceResult<()>;

    /// Records the caller's `host:port` on the root span.
    fn record_remote_address(&mut self, remote_address: &str) -> TraceResult<()>;

    /// Terminal operation: hands the trace off for reporting and
    /// releases anything it holds. Closing twice is an error.
    fn close(&mut self) -> TraceResult<()>;
}
