//! Interception hooks bound to the RPC framework's dispatch pipeline.
//!
//! The instrumentation host binds one [`AroundInterceptor`] to each
//! interception point and invokes its hooks with the observed call:
//! the target object, the argument list, and, on exit, the call's
//! outcome. Hooks never alter the call; everything they learn travels
//! through the [`InvocationContext`](crate::InvocationContext) owned
//! by the outermost stage.
//!
//! What the original runtime discovered with dynamic type checks is
//! expressed here as capability interfaces: a target that is a service
//! processor reports its uri through [`DispatchTarget::processor_uri`],
//! and an argument that reads from a transport exposes it through
//! [`CallArgument::transport`]. Everything else keeps the defaults and
//! resolution degrades to its unknown sentinel.

use std::error::Error;

use crate::context::InvocationContext;
use crate::transport::TransportHandle;

mod boundary;
mod function;

pub use boundary::DispatchBoundaryInterceptor;
pub use function::ProcessFunctionInterceptor;

/// Capability interface for intercepted dispatch targets.
pub trait DispatchTarget {
    /// Uri of the service processor, when the target is one.
    fn processor_uri(&self) -> Option<&str> {
        None
    }

    /// Name of the service method, when the target is a per-method
    /// process function.
    fn method_name(&self) -> Option<&str> {
        None
    }
}

/// Capability interface for arguments of an intercepted call.
pub trait CallArgument {
    /// The transport this argument reads from, when it carries one.
    fn transport(&self) -> Option<&dyn TransportHandle> {
        None
    }
}

/// The target and argument list of one intercepted call.
#[derive(Clone, Copy)]
pub struct CallSite<'a> {
    /// Object the intercepted method was invoked on.
    pub target: &'a dyn DispatchTarget,
    /// Arguments of the intercepted method, in declaration order.
    pub args: &'a [&'a dyn CallArgument],
}

impl std::fmt::Debug for CallSite<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallSite")
            .field("args", &self.args.len())
            .finish()
    }
}

/// The completion of one intercepted call.
///
/// Protocol-level errors are normal operation for some RPC servers, so
/// a populated `error` says nothing about sampling or trace health; it
/// is recorded as trace data and otherwise left alone.
#[derive(Clone, Copy, Default)]
pub struct CallOutcome<'a> {
    /// Error the intercepted method terminated with, if any.
    pub error: Option<&'a (dyn Error + 'static)>,
}

impl std::fmt::Debug for CallOutcome<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallOutcome")
            .field("failed", &self.error.is_some())
            .finish()
    }
}

/// Entry/exit hooks bound to one intercepted method.
///
/// The host guarantees `before` and `after` of one stage run on the
/// same thread with the same context, and that stages nest in the
/// structural order of the dispatch call graph; interceptors rely on
/// that ordering instead of synchronization.
pub trait AroundInterceptor {
    /// Invoked before the intercepted method body runs.
    fn before(&self, cx: &mut InvocationContext, call: &CallSite<'_>);

    /// Invoked after the intercepted method body returned or failed.
    fn after(&self, cx: &mut InvocationContext, call: &CallSite<'_>, outcome: &CallOutcome<'_>);
}
