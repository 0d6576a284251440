//! Invocation-scoped carrier state shared between interception stages.
//!
//! One RPC dispatch call is handled start to finish on one thread, but
//! the interception points that observe it fire at different places in
//! the framework's serialization pipeline and do not share a call
//! stack. An [`InvocationContext`] is created by the outermost stage,
//! threaded by mutable reference through every stage of that one call,
//! and dropped when the outermost stage exits. It carries the two
//! pieces of cross-stage state this crate needs: the in-flight trace
//! and the correlation attachment.

use crate::trace::Trace;

/// Cross-stage value identifying the method being invoked.
///
/// Written by whichever interception stage resolves the method identity
/// first (typically the per-function dispatch stage, which sees the
/// method name before the boundary stage exits), and read when the
/// boundary stage composes the rpc name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallAttachment {
    method_name: String,
}

impl CallAttachment {
    /// Creates an attachment carrying the resolved method name.
    pub fn new(method_name: impl Into<String>) -> Self {
        CallAttachment {
            method_name: method_name.into(),
        }
    }

    /// The resolved method name.
    pub fn method_name(&self) -> &str {
        &self.method_name
    }
}

/// Per-invocation state threaded through the interception chain.
///
/// Holds at most one active trace and at most one attachment. Both
/// slots treat absence as a normal state: an untraced call simply never
/// has a trace parked here. Exactly one stage, the dispatch boundary,
/// owns creating and dropping the context; nested stages only read and
/// write within its lifetime, so no synchronization is involved.
#[derive(Default)]
pub struct InvocationContext {
    trace: Option<Box<dyn Trace>>,
    attachment: Option<CallAttachment>,
}

impl InvocationContext {
    /// Creates an empty context for one dispatch call.
    pub fn new() -> Self {
        InvocationContext::default()
    }

    /// Returns the current trace, if one has been parked.
    pub fn trace_mut(&mut self) -> Option<&mut (dyn Trace + 'static)> {
        self.trace.as_deref_mut()
    }

    /// `true` when a trace is parked in this context.
    pub fn has_trace(&self) -> bool {
        self.trace.is_some()
    }

    /// Parks a trace in this context, returning any trace it displaced.
    pub fn set_trace(&mut self, trace: Box<dyn Trace>) -> Option<Box<dyn Trace>> {
        self.trace.replace(trace)
    }

    /// Removes and returns the current trace.
    ///
    /// Idempotent after the first call: subsequent calls return `None`
    /// until a new trace is parked. The boundary stage relies on this
    /// to guarantee a trace is never finalized twice and never leaks
    /// into later work on the same execution unit.
    pub fn take_trace(&mut self) -> Option<Box<dyn Trace>> {
        self.trace.take()
    }

    /// Returns the correlation attachment, if one has been written.
    pub fn attachment(&self) -> Option<&CallAttachment> {
        self.attachment.as_ref()
    }

    /// Writes the correlation attachment for this invocation.
    ///
    /// The slot is write-once: the first writer wins and `true` is
    /// returned; later writes are ignored and return `false`. Reads may
    /// happen any number of times afterwards.
    pub fn set_attachment(&mut self, attachment: CallAttachment) -> bool {
        if self.attachment.is_some() {
            return false;
        }
        self.attachment = Some(attachment);
        true
    }

    /// Clears the attachment slot, returning its value.
    ///
    /// Reserved for the stage that owns the invocation scope; nested
    /// stages must not clear state they did not write.
    pub fn clear_attachment(&mut self) -> Option<CallAttachment> {
        self.attachment.take()
    }
}

impl std::fmt::Debug for InvocationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvocationContext")
            .field("has_trace", &self.trace.is_some())
            .field("attachment", &self.attachment)
            .finish()
    }
}
