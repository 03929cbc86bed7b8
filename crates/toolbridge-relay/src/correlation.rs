//! The correlation loop: run a program in the sandbox and answer its tool calls.
//!
//! Each iteration submits one snippet and blocks on the execute response.
//! The first snippet writes the program and starts the runner; later ones
//! deliver the previous batch's results. The response envelope says whether
//! the program is blocked on calls, still busy, or finished.

use crate::dispatch::dispatch_batch;
use crate::records::{CallRecord, FinalResult, RelayResponse, ToolExchange};
use serde_json::json;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use toolbridge_core::context::with_session_id;
use toolbridge_core::{BridgeError, CallId, Result};
use toolbridge_observability::spans;
use toolbridge_sandbox::scripts::{launch_snippet, relay_snippet};
use toolbridge_sandbox::{sanitize_code_input, SandboxSession};
use toolbridge_tools::{rewrite_tool_references, strip_stub_imports, FunctionFilters, ToolMetadata, ToolRegistry};
use tracing::Instrument;

#[derive(Debug, Clone)]
pub struct CorrelationConfig {
    /// Upper bound on relay round trips per run
    pub max_iterations: usize,
    /// Fan a batch out with `join_all` instead of calling tools one by one
    pub concurrent_dispatch: bool,
    /// Consecutive `waiting` answers tolerated before giving up
    pub max_idle_polls: usize,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            max_iterations: 256,
            concurrent_dispatch: true,
            max_idle_polls: 10,
        }
    }
}

impl CorrelationConfig {
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_concurrent_dispatch(mut self, concurrent: bool) -> Self {
        self.concurrent_dispatch = concurrent;
        self
    }

    pub fn with_max_idle_polls(mut self, polls: usize) -> Self {
        self.max_idle_polls = polls;
        self
    }
}

/// Cooperative cancellation, observed between relay iterations.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct RelayOutcome {
    pub result: FinalResult,
    pub exchanges: Vec<ToolExchange>,
    /// Relay round trips, launch included
    pub iterations: usize,
}

pub struct CorrelationLoop {
    registry: Arc<ToolRegistry>,
    config: CorrelationConfig,
    filters: FunctionFilters,
}

impl CorrelationLoop {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self::with_config(registry, CorrelationConfig::default())
    }

    pub fn with_config(registry: Arc<ToolRegistry>, config: CorrelationConfig) -> Self {
        Self {
            registry,
            config,
            filters: FunctionFilters::default(),
        }
    }

    /// Only expose the tools these filters allow to the program.
    pub fn with_filters(mut self, filters: FunctionFilters) -> Self {
        self.filters = filters;
        self
    }

    pub fn config(&self) -> &CorrelationConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Tools visible to programs run by this loop, ordered by name.
    pub fn tools(&self) -> Vec<ToolMetadata> {
        self.registry.list_tools_filtered(&self.filters)
    }

    /// Program text as it will be written to `main.py`.
    pub async fn prepare_code(&self, session: &mut SandboxSession, code: &str) -> Result<String> {
        let code = if session.config().sanitize_input {
            sanitize_code_input(code)
        } else {
            code.to_string()
        };
        let tools = self.tools();
        let code = rewrite_tool_references(&code, tools.iter().map(|tool| &tool.name))?;
        let code = strip_stub_imports(&code);
        session.ensure_tools_uploaded(&tools).await?;
        Ok(format!("{}{}", session.prelude(), code))
    }

    /// Execute `code` in the session, answering its tool calls until it
    /// finishes. Tool handlers run with the session attached to the scope.
    pub async fn run(
        &self,
        session: &mut SandboxSession,
        code: &str,
        cancel: &CancellationFlag,
    ) -> Result<RelayOutcome> {
        let session_id = session.session_id().clone();
        with_session_id(session_id, self.run_scoped(session, code, cancel)).await
    }

    async fn run_scoped(
        &self,
        session: &mut SandboxSession,
        code: &str,
        cancel: &CancellationFlag,
    ) -> Result<RelayOutcome> {
        let program = self.prepare_code(session, code).await?;
        let mut submission = launch_snippet(&program);
        let mut exchanges = Vec::new();
        let mut answered: HashSet<CallId> = HashSet::new();
        let mut idle_polls = 0;

        for iteration in 0..self.config.max_iterations {
            if cancel.is_cancelled() {
                tracing::info!(session_id = %session.session_id(), iteration, "Relay cancelled");
                return Err(BridgeError::Cancelled { iterations: iteration });
            }

            let span = spans::relay_iteration(session.session_id().as_str(), iteration);
            let execution = session.execute(&submission).instrument(span.clone()).await?;
            let response = RelayResponse::from_execution(&execution)?;

            let calls = match response {
                RelayResponse::Final(result) => {
                    tracing::info!(
                        session_id = %session.session_id(),
                        iterations = iteration + 1,
                        tool_calls = exchanges.len(),
                        succeeded = result.succeeded(),
                        "Sandbox program finished"
                    );
                    return Ok(RelayOutcome {
                        result,
                        exchanges,
                        iterations: iteration + 1,
                    });
                }
                RelayResponse::Calls { calls } if calls.is_empty() => {
                    return Ok(RelayOutcome {
                        result: FinalResult::from_execution(&execution),
                        exchanges,
                        iterations: iteration + 1,
                    });
                }
                RelayResponse::Waiting => {
                    idle_polls += 1;
                    if idle_polls > self.config.max_idle_polls {
                        return Err(BridgeError::SessionState(format!(
                            "sandbox produced neither calls nor a result after {} polls",
                            idle_polls
                        )));
                    }
                    tracing::debug!(parent: &span, idle_polls, "Relay still waiting");
                    submission = relay_snippet(&json!([]));
                    continue;
                }
                RelayResponse::Calls { calls } => calls,
            };

            idle_polls = 0;
            let calls = fresh_calls(calls, &mut answered);
            tracing::debug!(parent: &span, calls = calls.len(), "Dispatching call batch");
            let results = dispatch_batch(&self.registry, &calls, self.config.concurrent_dispatch)
                .instrument(span)
                .await;
            submission = relay_snippet(&serde_json::to_value(&results)?);
            exchanges.extend(
                calls
                    .into_iter()
                    .zip(results)
                    .map(|(call, result)| ToolExchange { iteration, call, result }),
            );
        }

        Err(BridgeError::SessionState(format!(
            "relay did not finish within {} iterations",
            self.config.max_iterations
        )))
    }
}

/// Drop calls whose id was already answered in this run.
fn fresh_calls(calls: Vec<CallRecord>, answered: &mut HashSet<CallId>) -> Vec<CallRecord> {
    calls
        .into_iter()
        .filter(|call| {
            let fresh = answered.insert(call.id.clone());
            if !fresh {
                tracing::warn!(call_id = call.id.as_str(), "Ignoring repeated call id");
            }
            fresh
        })
        .collect()
}
