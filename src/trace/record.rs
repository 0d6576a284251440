//! Locally collected trace record.

use std::error::Error;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use crate::descriptor::MethodDescriptor;
use crate::error::{TraceError, TraceResult};
use crate::trace::Trace;

/// Lifecycle state of a [`TraceRecord`].
///
/// State only moves forward: `Active -> Annotating -> Closed`. A
/// record dropped before reaching `Closed` was discarded unannotated
/// (the unsampled path).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TraceState {
    /// Created; span-events may be opened while the call runs.
    Active,
    /// Finalization has started applying exit annotations.
    Annotating,
    /// Terminal; no further mutation is accepted.
    Closed,
}

/// One bracketed unit of timed work within a trace.
#[derive(Clone, Debug, PartialEq)]
pub struct SpanEvent {
    /// Wall-clock time the bracket was opened.
    pub begin_time: SystemTime,
    /// Wall-clock end stamp, set by `mark_after_time` or at block end.
    pub end_time: Option<SystemTime>,
    /// Full name of the traced method's descriptor.
    pub api: Option<String>,
    /// Rendered terminal error of the bracketed work.
    pub exception: Option<String>,
}

impl SpanEvent {
    fn open_at(begin_time: SystemTime) -> Self {
        SpanEvent {
            begin_time,
            end_time: None,
            api: None,
            exception: None,
        }
    }
}

/// Collected contents of one trace.
///
/// The root span fields live directly on this record; span-events keep
/// their own timing and markers. `open_events` is the stack of brackets
/// still open, `events` holds closed brackets in closing order.
#[derive(Clone, Debug, PartialEq)]
pub struct TraceData {
    /// Current lifecycle state.
    pub state: TraceState,
    /// Sampling decision made upstream.
    pub sampled: bool,
    /// Root span start.
    pub start_time: SystemTime,
    /// Root span end, stamped by `mark_after_time` with no open bracket.
    pub end_time: Option<SystemTime>,
    /// Resolved rpc name, e.g. `UserService/getUser`.
    pub rpc_name: Option<String>,
    /// Local `host:port` the call was served on.
    pub end_point: Option<String>,
    /// Caller `host:port`.
    pub remote_address: Option<String>,
    /// Rendered terminal error of the traced call.
    pub exception: Option<String>,
    /// Closed span-events, in closing order.
    pub events: Vec<SpanEvent>,
    /// Still-open span-events, innermost last.
    pub open_events: Vec<SpanEvent>,
}

/// A trace collected in process memory.
///
/// The record itself is driven through the [`Trace`] interface by the
/// interception stages. A [`TraceHandle`] obtained up front stays valid
/// after the record has been parked in (and removed from) an
/// invocation context, which is how the collected data reaches the
/// reporting side once the trace is closed.
#[derive(Debug)]
pub struct TraceRecord {
    data: Arc<Mutex<TraceData>>,
}

/// Shared read handle onto a [`TraceRecord`]'s collected data.
#[derive(Clone, Debug)]
pub struct TraceHandle {
    data: Arc<Mutex<TraceData>>,
}

impl TraceHandle {
    /// Returns a copy of the trace contents as collected so far.
    pub fn snapshot(&self) -> TraceData {
        match self.data.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl TraceRecord {
    /// Creates a record with the given sampling decision, stamping the
    /// root span start with the current wall-clock time.
    pub fn new(sampled: bool) -> Self {
        TraceRecord {
            data: Arc::new(Mutex::new(TraceData {
                state: TraceState::Active,
                sampled,
                start_time: SystemTime::now(),
                end_time: None,
                rpc_name: None,
                end_point: None,
                remote_address: None,
                exception: None,
                events: Vec::new(),
                open_events: Vec::new(),
            })),
        }
    }

    /// Get a shared read handle onto this record's data.
    pub fn handle(&self) -> TraceHandle {
        TraceHandle {
            data: self.data.clone(),
        }
    }

    /// Operate on the record data, rejecting closed records.
    fn mutate<T>(&self, f: impl FnOnce(&mut TraceData) -> TraceResult<T>) -> TraceResult<T> {
        let mut guard = self.data.lock()?;
        if guard.state == TraceState::Closed {
            return Err(TraceError::AlreadyClosed);
        }
        f(&mut guard)
    }

    /// Like [`Self::mutate`], additionally moving an `Active` record
    /// into `Annotating`.
    fn annotate<T>(&self, f: impl FnOnce(&mut TraceData) -> TraceResult<T>) -> TraceResult<T> {
        self.mutate(|data| {
            if data.state == TraceState::Active {
                data.state = TraceState::Annotating;
            }
            f(data)
        })
    }
}

impl Trace for TraceRecord {
    fn can_sample(&self) -> bool {
        self.data.lock().map(|data| data.sampled).unwrap_or(false)
    }

    fn trace_block_begin(&mut self) -> TraceResult<()> {
        self.mutate(|data| {
            data.open_events.push(SpanEvent::open_at(SystemTime::now()));
            Ok(())
        })
    }

    fn trace_block_end(&mut self) -> TraceResult<()> {
        self.annotate(|data| {
            let mut event = data.open_events.pop().ok_or(TraceError::NoOpenSpanEvent)?;
            if event.end_time.is_none() {
                event.end_time = Some(SystemTime::now());
            }
            data.events.push(event);
            Ok(())
        })
    }

    fn record_exception(&mut self, error: Option<&(dyn Error + 'static)>) -> TraceResult<()> {
        let Some(error) = error else {
            return Ok(());
        };
        self.annotate(|data| {
            let rendered = error.to_string();
            if let Some(open) = data.open_events.last_mut() {
                open.exception = Some(rendered.clone());
            }
            data.exception = Some(rendered);
            Ok(())
        })
    }

    fn record_api(&mut self, descriptor: &MethodDescriptor) -> TraceResult<()> {
        self.annotate(|data| {
            let open = data
                .open_events
                .last_mut()
                .ok_or(TraceError::NoOpenSpanEvent)?;
            open.api = Some(descriptor.full_name());
            Ok(())
        })
    }

    fn mark_after_time(&mut self) -> TraceResult<()> {
        self.annotate(|data| {
            let now = SystemTime::now();
            match data.open_events.last_mut() {
                Some(open) => open.end_time = Some(now),
                None => data.end_time = Some(now),
            }
            Ok(())
        })
    }

    fn record_rpc_name(&mut self, rpc_name: &str) -> TraceResult<()> {
        self.annotate(|data| {
            data.rpc_name = Some(rpc_name.to_owned());
            Ok(())
        })
    }

    fn record_end_point(&mut self, end_point: &str) -> TraceResult<()> {
        self.annotate(|data| {
            data.end_point = Some(end_point.to_owned());
            Ok(())
        })
    }

    fn record_remote_address(&mut self, remote_address: &str) -> TraceResult<()> {
        self.annotate(|data| {
            data.remote_address = Some(remote_address.to_owned());
            Ok(())
        })
    }

    fn close(&mut self) -> TraceResult<()> {
        self.mutate(|data| {
            data.state = TraceState::Closed;
            Ok(())
        })
    }
}
