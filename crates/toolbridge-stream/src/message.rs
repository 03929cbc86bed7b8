//! Per-message state machine that coalesces token deltas.

use crate::events::{
    ContentItem, DeltaContent, Message, MessageDelta, MessageStatus, Role, RunEvent, RunEventKind,
};
use toolbridge_core::context::unix_timestamp;
use toolbridge_core::{BridgeError, MessageId, Result, RunId, ThreadId};
use toolbridge_relay::ToolExchange;

/// One increment of model output.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageChunk {
    /// Id the model assigned to the message this chunk belongs to
    pub message_id: MessageId,
    pub text: String,
    /// Set on the last chunk of a message
    pub finished: bool,
}

impl MessageChunk {
    pub fn delta(message_id: MessageId, text: impl Into<String>) -> Self {
        Self {
            message_id,
            text: text.into(),
            finished: false,
        }
    }

    pub fn last(message_id: MessageId, text: impl Into<String>) -> Self {
        Self {
            message_id,
            text: text.into(),
            finished: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageState {
    None,
    Created,
    InProgress,
    Completed,
}

pub struct MessageStateMachine {
    thread_id: ThreadId,
    run_id: RunId,
    state: MessageState,
    /// Model-side id of the open message
    source_id: Option<MessageId>,
    current: Option<Message>,
    buffer: String,
    completed: Vec<Message>,
}

impl MessageStateMachine {
    pub fn new(thread_id: ThreadId, run_id: RunId) -> Self {
        Self {
            thread_id,
            run_id,
            state: MessageState::None,
            source_id: None,
            current: None,
            buffer: String::new(),
            completed: Vec::new(),
        }
    }

    pub fn state(&self) -> MessageState {
        self.state
    }

    pub fn has_open_message(&self) -> bool {
        self.current.is_some()
    }

    /// Feed one chunk. A chunk for another message while one is open is an error.
    pub fn on_chunk(&mut self, chunk: &MessageChunk) -> Result<Vec<RunEvent>> {
        if let Some(open) = &self.source_id
            && open != &chunk.message_id
        {
            return Err(BridgeError::Stream("Previous message was not finished.".to_string()));
        }

        let mut events = Vec::new();
        if chunk.text.is_empty() {
            if chunk.finished && self.current.is_some() {
                events.push(self.complete()?);
            }
            return Ok(events);
        }

        if self.current.is_none() {
            let message = Message::new(
                self.thread_id.clone(),
                Some(self.run_id.clone()),
                Role::Assistant,
                unix_timestamp(),
            );
            events.push(RunEvent::new(RunEventKind::MessageCreated, &message)?);
            self.state = MessageState::Created;
            events.push(RunEvent::new(RunEventKind::MessageInProgress, &message)?);
            self.state = MessageState::InProgress;
            self.source_id = Some(chunk.message_id.clone());
            self.current = Some(message);
        }

        self.buffer.push_str(&chunk.text);
        if let Some(message) = &self.current {
            let delta = MessageDelta {
                id: message.id.clone(),
                delta: DeltaContent {
                    text: chunk.text.clone(),
                },
            };
            events.push(RunEvent::new(RunEventKind::MessageDelta, &delta)?);
        }

        if chunk.finished {
            events.push(self.complete()?);
        }
        Ok(events)
    }

    /// Close the open message, if any, with everything buffered so far.
    pub fn finish(&mut self) -> Result<Option<RunEvent>> {
        if self.current.is_none() {
            return Ok(None);
        }
        self.complete().map(Some)
    }

    /// Tool exchanges skip the delta path: created and completed in one go.
    pub fn tool_exchange(&mut self, exchange: &ToolExchange) -> Result<Vec<RunEvent>> {
        let message = Message::tool_exchange(
            self.thread_id.clone(),
            Some(self.run_id.clone()),
            exchange,
            unix_timestamp(),
        );
        let mut created = message.clone();
        created.status = MessageStatus::InProgress;
        let events = vec![
            RunEvent::new(RunEventKind::MessageCreated, &created)?,
            RunEvent::new(RunEventKind::MessageCompleted, &message)?,
        ];
        self.completed.push(message);
        Ok(events)
    }

    /// Messages completed since the last call, in completion order.
    pub fn drain_completed(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.completed)
    }

    fn complete(&mut self) -> Result<RunEvent> {
        let mut message = self
            .current
            .take()
            .ok_or_else(|| BridgeError::Stream("no message in progress".to_string()))?;
        message.content = vec![ContentItem::Text {
            text: std::mem::take(&mut self.buffer),
        }];
        message.status = MessageStatus::Completed;
        self.state = MessageState::Completed;
        let event = RunEvent::new(RunEventKind::MessageCompleted, &message)?;
        self.completed.push(message);
        self.source_id = None;
        self.state = MessageState::None;
        Ok(event)
    }
}
