//! Run scope attribute helpers for spans and log lines.
//!
//! Extracts the task-local run scope (run_id, thread_id, session_id) so
//! spans and structured logs name the same identifiers.

use toolbridge_core::context::{current_run_id, current_session_id, current_thread_id};

/// Extract run scope attributes as `(run_id, thread_id, session_id)`.
#[inline]
pub fn scope_attributes() -> (Option<String>, Option<String>, Option<String>) {
    (
        current_run_id().map(|id| id.as_str().to_string()),
        current_thread_id().map(|id| id.as_str().to_string()),
        current_session_id().map(|id| id.as_str().to_string()),
    )
}

/// Format scope attributes for structured logging.
///
/// Returns `no_scope` outside of a run.
#[inline]
pub fn scope_summary() -> String {
    let (run_id, thread_id, session_id) = scope_attributes();
    let mut parts = Vec::new();
    if let Some(id) = run_id {
        parts.push(format!("run_id={}", id));
    }
    if let Some(id) = thread_id {
        parts.push(format!("thread_id={}", id));
    }
    if let Some(id) = session_id {
        parts.push(format!("session_id={}", id));
    }
    if parts.is_empty() {
        "no_scope".to_string()
    } else {
        parts.join(", ")
    }
}
