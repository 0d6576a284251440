//! Server-side trace finalization for synchronous RPC dispatch
//! boundaries.
//!
//! When an RPC framework dispatches a request to a service method, the
//! trace covering that request is assembled by several interception
//! points that fire at different places in the framework's
//! serialization pipeline and share no call stack. This crate provides
//! the pieces that coordinate them:
//!
//! * [`InvocationContext`]: the carrier threaded through every stage
//!   of one dispatch call, holding the in-flight trace and the
//!   cross-stage correlation attachment.
//! * [`trace::Trace`]: the lifecycle interface finalization drives:
//!   span-event bracketing, exception/api/timing annotations, root
//!   span fields, and the terminal close. [`trace::TraceRecord`] is
//!   the in-process implementation.
//! * [`interceptor::DispatchBoundaryInterceptor`]: the exit hook on
//!   the top-level dispatch call. It removes the parked trace exactly
//!   once and, when the trace is sampled, finalizes and closes it
//!   exactly once, even when individual annotation steps fail, and
//!   without ever altering the traced call's own outcome.
//! * [`interceptor::ProcessFunctionInterceptor`]: the upstream stage
//!   that resolves the service method's identity and parks it in the
//!   correlation slot.
//!
//! Absence is never an error here: an untraced call, a missing
//! attachment, or a transport with no socket underneath all degrade to
//! recording nothing. Tracing-internal failures are logged as warnings
//! through [`tracing`] and swallowed at the boundary.
//!
//! # Examples
//!
//! ```
//! use rpc_server_trace::interceptor::{
//!     AroundInterceptor, CallOutcome, CallSite, DispatchBoundaryInterceptor, DispatchTarget,
//! };
//! use rpc_server_trace::trace::{Trace, TraceRecord, TraceState};
//! use rpc_server_trace::{CallAttachment, InvocationContext, MethodDescriptor};
//!
//! struct UserProcessor;
//!
//! impl DispatchTarget for UserProcessor {
//!     fn processor_uri(&self) -> Option<&str> {
//!         Some("UserService/")
//!     }
//! }
//!
//! // An upstream stage creates the trace once the message header has
//! // been read, opens the span-event for the service call, and parks
//! // the resolved method name.
//! let mut cx = InvocationContext::new();
//! let mut trace = TraceRecord::new(true);
//! let handle = trace.handle();
//! trace.trace_block_begin().unwrap();
//! cx.set_trace(Box::new(trace));
//! cx.set_attachment(CallAttachment::new("getUser"));
//!
//! // The boundary interceptor observes the exit of dispatch.
//! let interceptor = DispatchBoundaryInterceptor::new(MethodDescriptor::new(
//!     "TBaseProcessor",
//!     "process",
//!     "(TProtocol in, TProtocol out)",
//! ));
//! let target = UserProcessor;
//! let call = CallSite {
//!     target: &target,
//!     args: &[],
//! };
//! interceptor.after(&mut cx, &call, &CallOutcome::default());
//!
//! let data = handle.snapshot();
//! assert_eq!(data.state, TraceState::Closed);
//! assert_eq!(data.rpc_name.as_deref(), Some("UserService/getUser"));
//! ```
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(test, deny(warnings))]

mod context;
mod descriptor;
mod error;

pub mod interceptor;
pub mod trace;
pub mod transport;

pub use context::{CallAttachment, InvocationContext};
pub use descriptor::MethodDescriptor;
pub use error::{TraceError, TraceResult};
