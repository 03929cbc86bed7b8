//! Drives one run from model output and tool exchanges to an event stream.

use crate::events::{Message, Run, RunEvent};
use crate::message::{MessageChunk, MessageStateMachine};
use crate::run::RunStateMachine;
use crate::sse::encode_event;
use crate::store::ConversationStore;
use futures_util::stream::{Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use toolbridge_core::context::{current_or_new_run_id, with_scope, RunScope};
use toolbridge_core::{BridgeError, Result, RunId, ThreadId};
use toolbridge_observability::{scope_summary, spans};
use toolbridge_relay::{RelayOutcome, ToolExchange};
use tracing::Instrument;

const DEFAULT_BUFFER: usize = 100;

/// What a run consumes, in arrival order.
#[derive(Debug, Clone)]
pub enum RunInput {
    Chunk(MessageChunk),
    /// Resolved call/result pairs from the correlation loop
    Tools(Vec<ToolExchange>),
}

impl From<MessageChunk> for RunInput {
    fn from(chunk: MessageChunk) -> Self {
        RunInput::Chunk(chunk)
    }
}

impl From<&RelayOutcome> for RunInput {
    fn from(outcome: &RelayOutcome) -> Self {
        RunInput::Tools(outcome.exchanges.clone())
    }
}

/// Sending half of a run's event channel.
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::Sender<RunEvent>,
}

impl EventSink {
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<RunEvent>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx }, rx)
    }

    pub async fn send(&self, event: RunEvent) -> Result<()> {
        tracing::trace!(event = event.name(), "Emitting run event");
        self.tx
            .send(event)
            .await
            .map_err(|_| BridgeError::Stream("event receiver dropped".to_string()))
    }

    pub async fn send_all(&self, events: Vec<RunEvent>) -> Result<()> {
        for event in events {
            self.send(event).await?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Final run object; `status` and `last_error` tell how it ended
    pub run: Run,
    /// Messages written to the conversation store
    pub persisted: Vec<Message>,
}

#[derive(Clone)]
pub struct RunDriver {
    store: Arc<dyn ConversationStore>,
    assistant_id: Option<String>,
    buffer: usize,
}

impl RunDriver {
    pub fn new(store: Arc<dyn ConversationStore>) -> Self {
        Self {
            store,
            assistant_id: None,
            buffer: DEFAULT_BUFFER,
        }
    }

    pub fn with_assistant_id(mut self, assistant_id: impl Into<String>) -> Self {
        self.assistant_id = Some(assistant_id.into());
        self
    }

    pub fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer;
        self
    }

    /// Run in the background and return its events; the last one is `done`.
    ///
    /// `inputs` receives the thread's prior messages and returns the run's
    /// input stream.
    pub fn stream_run<F, S>(&self, thread_id: ThreadId, inputs: F) -> impl Stream<Item = RunEvent> + Send + 'static
    where
        F: FnOnce(Vec<Message>) -> S + Send + 'static,
        S: Stream<Item = Result<RunInput>> + Send + 'static,
    {
        let (sink, receiver) = EventSink::channel(self.buffer);
        let driver = self.clone();
        tokio::spawn(async move {
            if let Err(err) = driver.drive(thread_id, inputs, &sink).await {
                tracing::warn!(error = %err, "Run stream ended early");
            }
        });
        ReceiverStream::new(receiver)
    }

    /// [`RunDriver::stream_run`] framed as server-sent events.
    pub fn stream_sse<F, S>(&self, thread_id: ThreadId, inputs: F) -> impl Stream<Item = String> + Send + 'static
    where
        F: FnOnce(Vec<Message>) -> S + Send + 'static,
        S: Stream<Item = Result<RunInput>> + Send + 'static,
    {
        self.stream_run(thread_id, inputs).map(|event| encode_event(&event))
    }

    /// Drive one run to completion, emitting every event through `sink`.
    pub async fn drive<F, S>(&self, thread_id: ThreadId, inputs: F, sink: &EventSink) -> Result<RunSummary>
    where
        F: FnOnce(Vec<Message>) -> S,
        S: Stream<Item = Result<RunInput>>,
    {
        let run_id = current_or_new_run_id();
        let scope = RunScope::new(run_id.clone(), Some(thread_id.clone()), None);
        let span = spans::run_stream(run_id.as_str(), thread_id.as_str());
        with_scope(scope, self.drive_scoped(run_id, thread_id, inputs, sink))
            .instrument(span)
            .await
    }

    async fn drive_scoped<F, S>(
        &self,
        run_id: RunId,
        thread_id: ThreadId,
        inputs: F,
        sink: &EventSink,
    ) -> Result<RunSummary>
    where
        F: FnOnce(Vec<Message>) -> S,
        S: Stream<Item = Result<RunInput>>,
    {
        tracing::info!(scope = %scope_summary(), "Run started");
        let mut run = RunStateMachine::new(run_id.clone(), thread_id.clone(), self.assistant_id.clone());
        sink.send_all(run.start()?).await?;

        let mut messages = MessageStateMachine::new(thread_id.clone(), run_id);
        let outcome = self.execute(&thread_id, inputs, &mut messages, sink).await;

        let (terminal, persisted) = match outcome {
            Ok(persisted) => (run.complete(), persisted),
            Err(err) => {
                tracing::warn!(error = %err, kind = err.kind(), "Run failed");
                (run.fail(&err), Vec::new())
            }
        };
        let terminal_sent = match terminal {
            Ok(events) => sink.send_all(events).await,
            Err(err) => Err(err),
        };
        sink.send(RunEvent::done()).await?;
        terminal_sent?;

        tracing::info!(status = ?run.run().status, persisted = persisted.len(), "Run finished");
        Ok(RunSummary {
            run: run.run().clone(),
            persisted,
        })
    }

    /// Consume inputs and persist the completed messages.
    async fn execute<F, S>(
        &self,
        thread_id: &ThreadId,
        inputs: F,
        messages: &mut MessageStateMachine,
        sink: &EventSink,
    ) -> Result<Vec<Message>>
    where
        F: FnOnce(Vec<Message>) -> S,
        S: Stream<Item = Result<RunInput>>,
    {
        let history = self.store.messages(thread_id).await?;
        tracing::debug!(history = history.len(), "Seeded run from conversation");
        let mut inputs = std::pin::pin!(inputs(history));

        while let Some(input) = inputs.next().await {
            let events = match input? {
                RunInput::Chunk(chunk) => messages.on_chunk(&chunk)?,
                RunInput::Tools(exchanges) => {
                    let mut events = Vec::new();
                    for exchange in &exchanges {
                        events.extend(messages.tool_exchange(exchange)?);
                    }
                    events
                }
            };
            sink.send_all(events).await?;
        }
        if let Some(event) = messages.finish()? {
            sink.send(event).await?;
        }

        let completed = messages.drain_completed();
        if !completed.is_empty() {
            self.store.append(thread_id, completed.clone()).await?;
        }
        Ok(completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RunEventKind;
    use crate::store::InMemoryConversationStore;
    use futures_util::stream;
    use toolbridge_core::MessageId;
    use tracing_test::traced_test;

    fn driver() -> RunDriver {
        RunDriver::new(Arc::new(InMemoryConversationStore::default()))
    }

    #[traced_test]
    #[test]
    fn failed_runs_are_logged_and_still_terminated() {
        let (sink, mut receiver) = EventSink::channel(64);
        let thread = ThreadId::from_external("t1");
        let first = MessageId::from_external("a");
        let second = MessageId::from_external("b");
        let inputs = vec![
            Ok(RunInput::Chunk(MessageChunk::delta(first, "Hel"))),
            Ok(RunInput::Chunk(MessageChunk::delta(second, "lo"))),
        ];

        let summary = tokio_test::block_on(driver().drive(thread, |_| stream::iter(inputs), &sink)).unwrap();
        drop(sink);

        let mut kinds = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            kinds.push(event.kind);
        }
        assert_eq!(kinds[kinds.len() - 3..], [RunEventKind::Error, RunEventKind::RunFailed, RunEventKind::Done]);
        assert!(summary.persisted.is_empty());
        assert!(logs_contain("Run failed"));
    }

    #[tokio::test]
    async fn dropped_receiver_stops_the_run() {
        let (sink, receiver) = EventSink::channel(1);
        drop(receiver);
        let result = driver()
            .drive(ThreadId::from_external("t1"), |_| stream::empty(), &sink)
            .await;
        assert!(matches!(result, Err(BridgeError::Stream(_))));
    }
}
