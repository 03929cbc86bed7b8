//! Host side of the sandbox tool-call channel.
//!
//! [`CorrelationLoop`] submits a program to a [`toolbridge_sandbox::SandboxSession`],
//! answers the [`CallRecord`]s its stubs write, and returns once the program
//! finishes.

pub mod correlation;
pub mod dispatch;
pub mod records;

pub use correlation::{CancellationFlag, CorrelationConfig, CorrelationLoop, RelayOutcome};
pub use dispatch::{dispatch_batch, dispatch_call};
pub use records::{CallRecord, FinalResult, RelayResponse, ResultRecord, ScriptError, ToolExchange};
