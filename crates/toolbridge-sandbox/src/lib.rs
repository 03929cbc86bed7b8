//! Remote Python sandbox sessions.
//!
//! A [`SandboxSession`] owns one interpreter session: it prepares the remote
//! folders and helper modules, uploads generated tool stubs, and passes file
//! operations through a [`SandboxTransport`].

pub mod config;
pub mod http;
pub mod layout;
pub mod sanitize;
pub mod scripts;
pub mod session;
pub mod transport;

pub use config::{ChannelSettings, SandboxConfig};
pub use http::{normalize_endpoint, HttpSandboxTransport, StaticToken, TokenProvider};
pub use sanitize::sanitize_code_input;
pub use session::{SandboxSession, SessionState, UploadedModule};
pub use transport::{ExecutionResult, RemoteFile, SandboxTransport};
