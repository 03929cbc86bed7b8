//! Run lifecycle state machine.

use crate::events::{Run, RunError, RunEvent, RunEventKind, RunStatus, RunStep, StepStatus};
use toolbridge_core::context::unix_timestamp;
use toolbridge_core::{BridgeError, Result, RunId, StepId, ThreadId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Created,
    Queued,
    InProgress,
    StepCreated,
    StepInProgress,
    Completed,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed)
    }

    fn status(&self) -> RunStatus {
        match self {
            RunState::Created => RunStatus::Created,
            RunState::Queued => RunStatus::Queued,
            RunState::InProgress | RunState::StepCreated | RunState::StepInProgress => RunStatus::InProgress,
            RunState::Completed => RunStatus::Completed,
            RunState::Failed => RunStatus::Failed,
        }
    }
}

pub struct RunStateMachine {
    state: RunState,
    run: Run,
    step: RunStep,
}

impl RunStateMachine {
    pub fn new(run_id: RunId, thread_id: ThreadId, assistant_id: Option<String>) -> Self {
        let created_at = unix_timestamp();
        Self {
            state: RunState::Created,
            step: RunStep {
                id: StepId::generate(),
                run_id: run_id.clone(),
                thread_id: thread_id.clone(),
                status: StepStatus::InProgress,
                created_at,
            },
            run: Run {
                id: run_id,
                thread_id,
                assistant_id,
                status: RunStatus::Created,
                created_at,
                last_error: None,
            },
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn run(&self) -> &Run {
        &self.run
    }

    /// `created`, `queued`, `in_progress`, `step.created`, `step.in_progress`.
    pub fn start(&mut self) -> Result<Vec<RunEvent>> {
        if self.state != RunState::Created {
            return Err(self.invalid("start"));
        }
        let mut events = vec![RunEvent::new(RunEventKind::RunCreated, &self.run)?];
        for (state, kind) in [
            (RunState::Queued, RunEventKind::RunQueued),
            (RunState::InProgress, RunEventKind::RunInProgress),
        ] {
            self.enter(state);
            events.push(RunEvent::new(kind, &self.run)?);
        }
        self.enter(RunState::StepCreated);
        events.push(RunEvent::new(RunEventKind::StepCreated, &self.step)?);
        self.enter(RunState::StepInProgress);
        events.push(RunEvent::new(RunEventKind::StepInProgress, &self.step)?);
        Ok(events)
    }

    /// `step.completed` then `run.completed`.
    pub fn complete(&mut self) -> Result<Vec<RunEvent>> {
        if self.state != RunState::StepInProgress {
            return Err(self.invalid("complete"));
        }
        self.step.status = StepStatus::Completed;
        self.enter(RunState::Completed);
        Ok(vec![
            RunEvent::new(RunEventKind::StepCompleted, &self.step)?,
            RunEvent::new(RunEventKind::RunCompleted, &self.run)?,
        ])
    }

    /// `error` then `run.failed`. Allowed from any non-terminal state.
    pub fn fail(&mut self, error: &BridgeError) -> Result<Vec<RunEvent>> {
        if self.state.is_terminal() {
            return Err(self.invalid("fail"));
        }
        self.step.status = StepStatus::Failed;
        self.run.last_error = Some(RunError::from(error));
        self.enter(RunState::Failed);
        Ok(vec![
            RunEvent::error(error.to_string()),
            RunEvent::new(RunEventKind::RunFailed, &self.run)?,
        ])
    }

    fn enter(&mut self, state: RunState) {
        self.state = state;
        self.run.status = state.status();
    }

    fn invalid(&self, action: &str) -> BridgeError {
        BridgeError::Stream(format!("cannot {} a run in state {:?}", action, self.state))
    }
}
