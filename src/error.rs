use std::sync::PoisonError;
use thiserror::Error;

/// A specialized `Result` type for trace annotation and lifecycle
/// operations.
pub type TraceResult<T> = Result<T, TraceError>;

/// Errors returned by trace annotation and lifecycle operations.
///
/// These errors never escape the interception layer: the boundary
/// interceptor catches them, logs a warning, and leaves the traced
/// call's own outcome untouched.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TraceError {
    /// The trace has already been closed and can no longer be mutated.
    #[error("trace already closed")]
    AlreadyClosed,

    /// A span-event operation was issued while no span-event was open.
    #[error("no open span-event")]
    NoOpenSpanEvent,

    /// Other errors propagated from a trace implementation.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl From<String> for TraceError {
    fn from(err_msg: String) -> Self {
        TraceError::Other(Box::new(Custom(err_msg)))
    }
}

impl From<&'static str> for TraceError {
    fn from(err_msg: &'static str) -> Self {
        TraceError::Other(Box::new(Custom(err_msg.into())))
    }
}

impl<T> From<PoisonError<T>> for TraceError {
    fn from(err: PoisonError<T>) -> Self {
        TraceError::Other(err.to_string().into())
    }
}

/// Wrap type for string
#[derive(Error, Debug)]
#[error("{0}")]
struct Custom(String);
