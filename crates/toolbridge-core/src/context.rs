//! Run scope propagation for async invocation flows.
//!
//! This module provides a task-local scope so that log lines emitted deep in
//! the relay loop or a tool handler can still be attributed to a run.

use crate::ids::{RunId, SessionId, ThreadId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone)]
pub struct RunScope {
    pub run_id: RunId,
    pub thread_id: Option<ThreadId>,
    pub session_id: Option<SessionId>,
}

impl RunScope {
    pub fn new(run_id: RunId, thread_id: Option<ThreadId>, session_id: Option<SessionId>) -> Self {
        Self { run_id, thread_id, session_id }
    }
}

tokio::task_local! {
    static RUN_SCOPE: RunScope;
}

static RUN_COUNTER: AtomicU64 = AtomicU64::new(1);

pub fn generate_run_id() -> RunId {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    let counter = RUN_COUNTER.fetch_add(1, Ordering::Relaxed);
    RunId::new(millis, counter)
}

/// Seconds since the unix epoch, used for `created_at` fields.
pub fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

pub fn current_scope() -> Option<RunScope> {
    RUN_SCOPE.try_with(|scope| scope.clone()).ok()
}

pub fn current_run_id() -> Option<RunId> {
    current_scope().map(|scope| scope.run_id)
}

pub fn current_thread_id() -> Option<ThreadId> {
    current_scope().and_then(|scope| scope.thread_id)
}

pub fn current_session_id() -> Option<SessionId> {
    current_scope().and_then(|scope| scope.session_id)
}

pub fn current_or_new_run_id() -> RunId {
    current_run_id().unwrap_or_else(generate_run_id)
}

pub async fn with_scope<F, T>(scope: RunScope, fut: F) -> T
where
    F: std::future::Future<Output = T>,
{
    RUN_SCOPE.scope(scope, fut).await
}

/// Run `fut` with `id` as the scope's session.
///
/// Attaches to the enclosing scope when there is one; otherwise opens a new
/// scope under a fresh run id.
pub async fn with_session_id<F, T>(id: SessionId, fut: F) -> T
where
    F: std::future::Future<Output = T>,
{
    let scope = match current_scope() {
        Some(scope) => RunScope::new(scope.run_id, scope.thread_id, Some(id)),
        None => RunScope::new(generate_run_id(), None, Some(id)),
    };
    with_scope(scope, fut).await
}
