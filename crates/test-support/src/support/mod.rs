pub mod cli;
pub mod scripted;
pub mod tools;

pub use cli::CliHarness;
pub use scripted::{RecordedRequest, ScriptedReply, ScriptedSandbox};
pub use tools::*;
