use tracing::{debug, warn};

use crate::context::InvocationContext;
use crate::descriptor::MethodDescriptor;
use crate::error::TraceResult;
use crate::interceptor::{AroundInterceptor, CallArgument, CallOutcome, CallSite, DispatchTarget};
use crate::trace::{Trace, UNKNOWN_METHOD_URI};
use crate::transport::SocketAddressPair;

/// Exit hook for the framework's top-level dispatch call.
///
/// Trace objects cannot be created until enough of the message has been
/// read, so earlier stages in the pipeline create the trace, park it in
/// the invocation context, and record the resolved method identity in
/// the correlation slot. This interceptor only observes the exit of
/// dispatch: it removes the parked trace unconditionally and, for
/// sampled traces, runs the finalize sequence (exception, api
/// descriptor, operation end stamp, span-event close, rpc name,
/// addressing, RPC-level end stamp) before closing the trace.
///
/// The close is guaranteed: it runs on every exit path from the
/// finalize sequence, and a tracing-internal failure anywhere in the
/// sequence is logged and swallowed so the traced call's own outcome
/// is never altered.
#[derive(Debug)]
pub struct DispatchBoundaryInterceptor {
    descriptor: MethodDescriptor,
}

impl DispatchBoundaryInterceptor {
    /// Creates the boundary interceptor for the dispatch method
    /// identified by `descriptor`.
    pub fn new(descriptor: MethodDescriptor) -> Self {
        DispatchBoundaryInterceptor { descriptor }
    }

    fn process_trace(
        &self,
        trace: &mut dyn Trace,
        cx: &InvocationContext,
        call: &CallSite<'_>,
        outcome: &CallOutcome<'_>,
    ) -> TraceResult<()> {
        // End the span-event covering the dispatch call. The block end
        // must run even when the annotations fail.
        if let Err(err) = self.annotate_span_event(trace, outcome) {
            warn!(
                name: "DispatchBoundary.AnnotateFailed",
                error = %err,
                "error annotating span-event"
            );
        }
        trace.trace_block_end()?;

        // End the root span.
        let rpc_name = resolve_rpc_name(cx, call.target);
        if rpc_name != UNKNOWN_METHOD_URI {
            trace.record_rpc_name(&rpc_name)?;
        }
        if let Some(addresses) = resolve_addresses(call.args) {
            trace.record_end_point(&addresses.local.to_string())?;
            trace.record_remote_address(&addresses.remote.to_string())?;
        }
        // Second stamp on purpose: the first one timed the operation
        // inside the span-event, this one is the RPC-level timing.
        trace.mark_after_time()
    }

    fn annotate_span_event(
        &self,
        trace: &mut dyn Trace,
        outcome: &CallOutcome<'_>,
    ) -> TraceResult<()> {
        trace.record_exception(outcome.error)?;
        trace.record_api(&self.descriptor)?;
        trace.mark_after_time()
    }
}

impl AroundInterceptor for DispatchBoundaryInterceptor {
    fn before(&self, _cx: &mut InvocationContext, _call: &CallSite<'_>) {
        // The trace, if any, is created by an upstream stage once the
        // message header has been read.
    }

    fn after(&self, cx: &mut InvocationContext, call: &CallSite<'_>, outcome: &CallOutcome<'_>) {
        let Some(mut trace) = cx.take_trace() else {
            return;
        };
        // Some servers depend on protocol exceptions for normal
        // operation, so the exit is logged only when the call is
        // actually traced.
        debug!(
            name: "DispatchBoundary.Exit",
            args = call.args.len(),
            failed = outcome.error.is_some(),
        );
        if !trace.can_sample() {
            // Discarded: removal from the context was the only cost.
            return;
        }
        let mut guard = CloseGuard::new(trace.as_mut());
        if let Err(err) = self.process_trace(guard.get(), cx, call, outcome) {
            warn!(
                name: "DispatchBoundary.ProcessTraceFailed",
                error = %err,
                "error processing trace object"
            );
        }
        // Dropping the guard closes the trace on every exit path.
    }
}

/// Closes the guarded trace when dropped.
struct CloseGuard<'a> {
    trace: &'a mut (dyn Trace + 'a),
}

impl<'a> CloseGuard<'a> {
    fn new(trace: &'a mut (dyn Trace + 'a)) -> Self {
        CloseGuard { trace }
    }

    fn get(&mut self) -> &mut (dyn Trace + 'a) {
        &mut *self.trace
    }
}

impl Drop for CloseGuard<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.trace.close() {
            warn!(
                name: "DispatchBoundary.CloseFailed",
                error = %err,
                "error closing trace"
            );
        }
    }
}

/// Composes `<processor-uri>/<method-name>` from the correlation slot
/// and the target's processor capability; degrades to the unknown
/// sentinel when either half is missing.
fn resolve_rpc_name(cx: &InvocationContext, target: &dyn DispatchTarget) -> String {
    let (Some(attachment), Some(uri)) = (cx.attachment(), target.processor_uri()) else {
        return UNKNOWN_METHOD_URI.to_owned();
    };
    let method_name = attachment.method_name();
    let mut rpc_name = String::with_capacity(uri.len() + method_name.len() + 1);
    rpc_name.push_str(uri);
    if !rpc_name.ends_with('/') {
        rpc_name.push('/');
    }
    rpc_name.push_str(method_name);
    rpc_name
}

/// Addressing is only resolvable for the two-argument protocol-read
/// shape `(input, output)` where the input argument carries a
/// socket-backed transport.
fn resolve_addresses(args: &[&dyn CallArgument]) -> Option<SocketAddressPair> {
    if args.len() != 2 {
        return None;
    }
    args.first()?.transport()?.socket_addresses()
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::error::Error;
    use std::rc::Rc;

    use rstest::rstest;

    use super::*;
    use crate::context::CallAttachment;
    use crate::error::TraceError;
    use crate::transport::TransportHandle;

    #[derive(Debug, thiserror::Error)]
    #[error("connection reset")]
    struct CallFailure;

    struct Processor(&'static str);

    impl DispatchTarget for Processor {
        fn processor_uri(&self) -> Option<&str> {
            Some(self.0)
        }
    }

    struct PlainTarget;

    impl DispatchTarget for PlainTarget {}

    struct SocketTransport(SocketAddressPair);

    impl TransportHandle for SocketTransport {
        fn socket_addresses(&self) -> Option<SocketAddressPair> {
            Some(self.0)
        }
    }

    struct ProtocolArg(SocketTransport);

    impl CallArgument for ProtocolArg {
        fn transport(&self) -> Option<&dyn TransportHandle> {
            Some(&self.0)
        }
    }

    struct PlainArg;

    impl CallArgument for PlainArg {}

    /// Trace double recording the mutating operations applied to it,
    /// with a single injectable failure point.
    struct RecordingTrace {
        sampled: bool,
        fail_on: Option<&'static str>,
        ops: Rc<RefCell<Vec<String>>>,
    }

    impl RecordingTrace {
        fn sampled(ops: Rc<RefCell<Vec<String>>>) -> Self {
            RecordingTrace {
                sampled: true,
                fail_on: None,
                ops,
            }
        }

        fn unsampled(ops: Rc<RefCell<Vec<String>>>) -> Self {
            RecordingTrace {
                sampled: false,
                fail_on: None,
                ops,
            }
        }

        fn failing_on(fail_on: &'static str, ops: Rc<RefCell<Vec<String>>>) -> Self {
            RecordingTrace {
                sampled: true,
                fail_on: Some(fail_on),
                ops,
            }
        }

        fn apply(&mut self, op: String) -> TraceResult<()> {
            let failed = self.fail_on == Some(op.split(':').next().unwrap_or(&op));
            self.ops.borrow_mut().push(op);
            if failed {
                Err(TraceError::from("injected failure"))
            } else {
                Ok(())
            }
        }
    }

    impl Trace for RecordingTrace {
        fn can_sample(&self) -> bool {
            self.sampled
        }

        fn trace_block_begin(&mut self) -> TraceResult<()> {
            self.apply("trace_block_begin".into())
        }

        fn trace_block_end(&mut self) -> TraceResult<()> {
            self.apply("trace_block_end".into())
        }

        fn record_exception(&mut self, error: Option<&(dyn Error + 'static)>) -> TraceResult<()> {
            match error {
                Some(error) => self.apply(format!("record_exception:{error}")),
                None => Ok(()),
            }
        }

        fn record_api(&mut self, descriptor: &MethodDescriptor) -> TraceResult<()> {
            self.apply(format!("record_api:{}", descriptor.full_name()))
        }

        fn mark_after_time(&mut self) -> TraceResult<()> {
            self.apply("mark_after_time".into())
        }

        fn record_rpc_name(&mut self, rpc_name: &str) -> TraceResult<()> {
            self.apply(format!("record_rpc_name:{rpc_name}"))
        }

        fn record_end_point(&mut self, end_point: &str) -> TraceResult<()> {
            self.apply(format!("record_end_point:{end_point}"))
        }

        fn record_remote_address(&mut self, remote_address: &str) -> TraceResult<()> {
            self.apply(format!("record_remote_address:{remote_address}"))
        }

        fn close(&mut self) -> TraceResult<()> {
            self.apply("close".into())
        }
    }

    fn interceptor() -> DispatchBoundaryInterceptor {
        DispatchBoundaryInterceptor::new(MethodDescriptor::new(
            "TBaseProcessor",
            "process",
            "(TProtocol in, TProtocol out)",
        ))
    }

    fn address_pair() -> SocketAddressPair {
        SocketAddressPair {
            local: "10.0.0.1:9090".parse().unwrap(),
            remote: "10.0.0.2:5555".parse().unwrap(),
        }
    }

    #[test]
    fn untraced_call_is_a_no_op() {
        let mut cx = InvocationContext::new();
        cx.set_attachment(CallAttachment::new("getUser"));

        let target = Processor("UserService/");
        let call = CallSite {
            target: &target,
            args: &[],
        };
        interceptor().after(&mut cx, &call, &CallOutcome::default());

        assert!(!cx.has_trace());
        assert_eq!(cx.attachment().unwrap().method_name(), "getUser");
    }

    #[test]
    fn unsampled_trace_is_removed_without_annotation() {
        let ops = Rc::new(RefCell::new(Vec::new()));
        let mut cx = InvocationContext::new();
        cx.set_trace(Box::new(RecordingTrace::unsampled(ops.clone())));

        let target = Processor("UserService/");
        let call = CallSite {
            target: &target,
            args: &[],
        };
        interceptor().after(&mut cx, &call, &CallOutcome::default());

        assert!(!cx.has_trace());
        assert!(ops.borrow().is_empty());
    }

    #[test]
    fn sampled_trace_finalizes_in_order() {
        let ops = Rc::new(RefCell::new(Vec::new()));
        let mut cx = InvocationContext::new();
        cx.set_trace(Box::new(RecordingTrace::sampled(ops.clone())));
        cx.set_attachment(CallAttachment::new("getUser"));

        let target = Processor("UserService/");
        let input = ProtocolArg(SocketTransport(address_pair()));
        let output = PlainArg;
        let args: [&dyn CallArgument; 2] = [&input, &output];
        let call = CallSite {
            target: &target,
            args: &args,
        };
        let failure = CallFailure;
        let outcome = CallOutcome {
            error: Some(&failure),
        };
        interceptor().after(&mut cx, &call, &outcome);

        assert!(!cx.has_trace());
        assert_eq!(
            *ops.borrow(),
            [
                "record_exception:connection reset",
                "record_api:TBaseProcessor.process(TProtocol in, TProtocol out)",
                "mark_after_time",
                "trace_block_end",
                "record_rpc_name:UserService/getUser",
                "record_end_point:10.0.0.1:9090",
                "record_remote_address:10.0.0.2:5555",
                "mark_after_time",
                "close",
            ]
        );
    }

    #[test]
    fn unresolved_rpc_name_is_not_recorded() {
        let ops = Rc::new(RefCell::new(Vec::new()));
        let mut cx = InvocationContext::new();
        cx.set_trace(Box::new(RecordingTrace::sampled(ops.clone())));

        let target = PlainTarget;
        let call = CallSite {
            target: &target,
            args: &[],
        };
        interceptor().after(&mut cx, &call, &CallOutcome::default());

        assert!(!ops
            .borrow()
            .iter()
            .any(|op| op.starts_with("record_rpc_name")));
        assert_eq!(ops.borrow().last().map(String::as_str), Some("close"));
    }

    #[rstest]
    #[case("record_exception")]
    #[case("record_api")]
    #[case("trace_block_end")]
    #[case("record_rpc_name")]
    #[case("record_end_point")]
    #[case("mark_after_time")]
    fn close_runs_exactly_once_when_an_annotation_fails(#[case] fail_on: &'static str) {
        let ops = Rc::new(RefCell::new(Vec::new()));
        let mut cx = InvocationContext::new();
        cx.set_trace(Box::new(RecordingTrace::failing_on(fail_on, ops.clone())));
        cx.set_attachment(CallAttachment::new("getUser"));

        let target = Processor("UserService/");
        let input = ProtocolArg(SocketTransport(address_pair()));
        let output = PlainArg;
        let args: [&dyn CallArgument; 2] = [&input, &output];
        let call = CallSite {
            target: &target,
            args: &args,
        };
        let failure = CallFailure;
        let outcome = CallOutcome {
            error: Some(&failure),
        };
        interceptor().after(&mut cx, &call, &outcome);

        let ops = ops.borrow();
        assert_eq!(ops.iter().filter(|op| *op == "close").count(), 1);
        assert_eq!(ops.last().map(String::as_str), Some("close"));
    }

    #[rstest]
    #[case("UserService/", "UserService/getUser")]
    #[case("UserService", "UserService/getUser")]
    fn rpc_name_composition(#[case] uri: &'static str, #[case] expected: &str) {
        let mut cx = InvocationContext::new();
        cx.set_attachment(CallAttachment::new("getUser"));
        assert_eq!(resolve_rpc_name(&cx, &Processor(uri)), expected);
    }

    #[test]
    fn rpc_name_degrades_to_unknown() {
        // no attachment
        let cx = InvocationContext::new();
        assert_eq!(
            resolve_rpc_name(&cx, &Processor("UserService/")),
            UNKNOWN_METHOD_URI
        );

        // attachment present but target is not a processor
        let mut cx = InvocationContext::new();
        cx.set_attachment(CallAttachment::new("getUser"));
        assert_eq!(resolve_rpc_name(&cx, &PlainTarget), UNKNOWN_METHOD_URI);
    }

    #[test]
    fn addresses_require_the_two_argument_protocol_shape() {
        let input = ProtocolArg(SocketTransport(address_pair()));
        let plain = PlainArg;

        let matching: [&dyn CallArgument; 2] = [&input, &plain];
        assert_eq!(resolve_addresses(&matching), Some(address_pair()));

        let too_short: [&dyn CallArgument; 1] = [&input];
        assert_eq!(resolve_addresses(&too_short), None);

        let too_long: [&dyn CallArgument; 3] = [&input, &plain, &plain];
        assert_eq!(resolve_addresses(&too_long), None);

        let no_transport: [&dyn CallArgument; 2] = [&plain, &plain];
        assert_eq!(resolve_addresses(&no_transport), None);

        // transport present only in the output position
        let wrong_position: [&dyn CallArgument; 2] = [&plain, &input];
        assert_eq!(resolve_addresses(&wrong_position), None);
    }
}
