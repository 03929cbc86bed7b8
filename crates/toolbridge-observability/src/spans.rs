//! Span constructors for the hot paths.
//!
//! Each span carries the run scope attributes so nested log lines can be
//! attributed to a run without threading ids through every call.

use crate::scope::scope_attributes;
use tracing::{info_span, Span};

/// One remote execute request.
pub fn sandbox_execute(session_id: &str, operation: &str) -> Span {
    let (run_id, thread_id, _) = scope_attributes();
    info_span!(
        "sandbox.execute",
        session_id = session_id,
        operation = operation,
        run_id = run_id.as_deref().unwrap_or(""),
        thread_id = thread_id.as_deref().unwrap_or(""),
    )
}

/// One relay round trip of the correlation loop.
pub fn relay_iteration(session_id: &str, iteration: usize) -> Span {
    let (run_id, _, _) = scope_attributes();
    info_span!(
        "relay.iteration",
        session_id = session_id,
        iteration = iteration,
        run_id = run_id.as_deref().unwrap_or(""),
    )
}

/// Dispatch of a single call record to a host tool.
pub fn tool_dispatch(call_id: &str, tool: &str) -> Span {
    let (run_id, _, session_id) = scope_attributes();
    info_span!(
        "tool.dispatch",
        call_id = call_id,
        tool = tool,
        run_id = run_id.as_deref().unwrap_or(""),
        session_id = session_id.as_deref().unwrap_or(""),
    )
}

/// Streaming of one run's event sequence.
pub fn run_stream(run_id: &str, thread_id: &str) -> Span {
    info_span!("run.stream", run_id = run_id, thread_id = thread_id)
}
