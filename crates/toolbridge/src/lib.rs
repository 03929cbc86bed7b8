//! Bridge host-side tools into remote Python sandboxes.
//!
//! Each layer lives in its own crate and is re-exported here behind a cargo
//! feature of the same name. The default feature set enables everything.

pub use toolbridge_core::{context, error, ids, BridgeError, Result};

#[cfg(feature = "tools")]
pub use toolbridge_tools as tools;

#[cfg(feature = "sandbox")]
pub use toolbridge_sandbox as sandbox;

#[cfg(feature = "relay")]
pub use toolbridge_relay as relay;

#[cfg(feature = "stream")]
pub use toolbridge_stream as stream;

#[cfg(feature = "observability")]
pub use toolbridge_observability as observability;

/// Common imports for hosts embedding the bridge.
pub mod prelude {
    pub use toolbridge_core::{BridgeError, CallId, MessageId, Result, RunId, SessionId, ThreadId};

    #[cfg(feature = "tools")]
    pub use toolbridge_tools::{FunctionFilters, HostTool, StubMode, ToolMetadata, ToolName, ToolRegistry};

    #[cfg(feature = "sandbox")]
    pub use toolbridge_sandbox::{SandboxConfig, SandboxSession, SandboxTransport};

    #[cfg(feature = "relay")]
    pub use toolbridge_relay::{CancellationFlag, CorrelationConfig, CorrelationLoop, RelayOutcome};

    #[cfg(feature = "stream")]
    pub use toolbridge_stream::{
        ConversationStore, InMemoryConversationStore, MessageChunk, RunDriver, RunEvent, RunInput,
    };
}
