//! Run lifecycle events and the objects they carry.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use toolbridge_core::{BridgeError, CallId, MessageId, Result, RunId, StepId, ThreadId};
use toolbridge_relay::ToolExchange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunEventKind {
    RunCreated,
    RunQueued,
    RunInProgress,
    StepCreated,
    StepInProgress,
    MessageCreated,
    MessageInProgress,
    MessageDelta,
    MessageCompleted,
    StepCompleted,
    RunCompleted,
    RunFailed,
    Error,
    Done,
}

impl RunEventKind {
    /// Event name on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            RunEventKind::RunCreated => "thread.run.created",
            RunEventKind::RunQueued => "thread.run.queued",
            RunEventKind::RunInProgress => "thread.run.in_progress",
            RunEventKind::StepCreated => "thread.run.step.created",
            RunEventKind::StepInProgress => "thread.run.step.in_progress",
            RunEventKind::MessageCreated => "thread.message.created",
            RunEventKind::MessageInProgress => "thread.message.in_progress",
            RunEventKind::MessageDelta => "thread.message.delta",
            RunEventKind::MessageCompleted => "thread.message.completed",
            RunEventKind::StepCompleted => "thread.run.step.completed",
            RunEventKind::RunCompleted => "thread.run.completed",
            RunEventKind::RunFailed => "thread.run.failed",
            RunEventKind::Error => "error",
            RunEventKind::Done => "done",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunEventKind::Done)
    }
}

impl std::fmt::Display for RunEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One event of a run's ordered sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct RunEvent {
    pub kind: RunEventKind,
    pub data: Value,
}

impl RunEvent {
    pub fn new<T: Serialize>(kind: RunEventKind, payload: &T) -> Result<Self> {
        Ok(Self {
            kind,
            data: serde_json::to_value(payload)?,
        })
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: RunEventKind::Error,
            data: json!({ "message": message.into() }),
        }
    }

    pub fn done() -> Self {
        Self {
            kind: RunEventKind::Done,
            data: Value::Null,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind.as_str()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Created,
    Queued,
    InProgress,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunError {
    pub code: String,
    pub message: String,
}

impl From<&BridgeError> for RunError {
    fn from(error: &BridgeError) -> Self {
        Self {
            code: error.kind().to_string(),
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub thread_id: ThreadId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assistant_id: Option<String>,
    pub status: RunStatus,
    pub created_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<RunError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    InProgress,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStep {
    pub id: StepId,
    pub run_id: RunId,
    pub thread_id: ThreadId,
    pub status: StepStatus,
    pub created_at: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    InProgress,
    Completed,
}

/// Structured message content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentItem {
    Text {
        text: String,
    },
    ToolCall {
        id: CallId,
        namespace: String,
        name: String,
        arguments: Value,
    },
    ToolResult {
        id: CallId,
        namespace: String,
        name: String,
        result: Value,
        is_error: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub thread_id: ThreadId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,
    pub role: Role,
    pub status: MessageStatus,
    pub content: Vec<ContentItem>,
    pub created_at: u64,
}

impl Message {
    pub fn new(thread_id: ThreadId, run_id: Option<RunId>, role: Role, created_at: u64) -> Self {
        Self {
            id: MessageId::generate(),
            thread_id,
            run_id,
            role,
            status: MessageStatus::InProgress,
            content: Vec::new(),
            created_at,
        }
    }

    /// Concatenated text items.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|item| match item {
                ContentItem::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Completed tool message carrying one call and its result.
    pub fn tool_exchange(thread_id: ThreadId, run_id: Option<RunId>, exchange: &ToolExchange, created_at: u64) -> Self {
        let mut message = Self::new(thread_id, run_id, Role::Tool, created_at);
        message.content = vec![
            ContentItem::ToolCall {
                id: exchange.call.id.clone(),
                namespace: exchange.call.namespace.clone(),
                name: exchange.call.name.clone(),
                arguments: exchange.call.arguments.clone(),
            },
            ContentItem::ToolResult {
                id: exchange.result.id.clone(),
                namespace: exchange.result.namespace.clone(),
                name: exchange.result.name.clone(),
                result: exchange.result.result.clone(),
                is_error: exchange.result.is_error,
            },
        ];
        message.status = MessageStatus::Completed;
        message
    }
}

/// Payload of `thread.message.delta`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageDelta {
    pub id: MessageId,
    pub delta: DeltaContent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaContent {
    pub text: String,
}
