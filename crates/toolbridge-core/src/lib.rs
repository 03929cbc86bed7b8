//! Core types shared by the sandbox tool bridge crates.

pub mod context;
pub mod error;
pub mod ids;

pub use error::{BridgeError, Result};
pub use ids::{CallId, MessageId, RunId, SessionId, StepId, ThreadId};
