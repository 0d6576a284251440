use tracing::debug;

use crate::context::{CallAttachment, InvocationContext};
use crate::interceptor::{AroundInterceptor, CallOutcome, CallSite};

/// Entry hook for the per-method process function.
///
/// This stage runs inside the dispatch boundary and is the first point
/// in the pipeline that knows which service method is being invoked. It
/// parks the resolved method name in the correlation slot so the
/// boundary stage can compose the rpc name on exit; everything else,
/// including finalization, belongs to other stages.
#[derive(Debug, Default)]
pub struct ProcessFunctionInterceptor;

impl ProcessFunctionInterceptor {
    /// Creates the process-function interceptor.
    pub fn new() -> Self {
        ProcessFunctionInterceptor
    }
}

impl AroundInterceptor for ProcessFunctionInterceptor {
    fn before(&self, cx: &mut InvocationContext, call: &CallSite<'_>) {
        let Some(method_name) = call.target.method_name() else {
            return;
        };
        if !cx.set_attachment(CallAttachment::new(method_name)) {
            // the slot is write-once; an earlier stage already resolved
            // the method identity for this invocation
            debug!(
                name: "ProcessFunction.AttachmentAlreadySet",
                method_name = method_name,
            );
        }
    }

    fn after(&self, _cx: &mut InvocationContext, _call: &CallSite<'_>, _outcome: &CallOutcome<'_>) {
        // Finalization is owned by the dispatch boundary stage.
    }
}
