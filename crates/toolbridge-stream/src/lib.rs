//! Run and message streaming.
//!
//! Turns incremental model output and resolved tool exchanges into the
//! ordered `thread.*` event sequence of one run, framed as server-sent events.

pub mod driver;
pub mod events;
pub mod message;
pub mod run;
pub mod sse;
pub mod store;

pub use driver::{EventSink, RunDriver, RunInput, RunSummary};
pub use events::{
    ContentItem, Message, MessageDelta, MessageStatus, Role, Run, RunError, RunEvent, RunEventKind, RunStatus,
    RunStep, StepStatus,
};
pub use message::{MessageChunk, MessageState, MessageStateMachine};
pub use run::{RunState, RunStateMachine};
pub use sse::{encode_event, encode_events, parse_frames, DONE_FRAME};
pub use store::{ConversationLog, ConversationStore, InMemoryConversationStore};
