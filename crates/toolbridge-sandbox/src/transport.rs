//! The seam between a session and the remote code interpreter.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use toolbridge_core::{Result, SessionId};

/// Outcome of one synchronous execute request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    /// Value of the last expression of the submitted code
    #[serde(default)]
    pub result: Value,
    #[serde(default, rename = "executionTimeInMilliseconds")]
    pub execution_time_ms: u64,
}

impl ExecutionResult {
    pub fn succeeded(&self) -> bool {
        self.status.is_empty() || self.status.eq_ignore_ascii_case("success") || self.status.eq_ignore_ascii_case("succeeded")
    }
}

/// A file stored in the session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    pub filename: String,
    #[serde(default)]
    pub bytes: Option<u64>,
    #[serde(default)]
    pub last_modified_time: Option<String>,
    #[serde(default)]
    pub full_path: Option<String>,
}

/// Remote interpreter operations, all scoped to one session identifier.
///
/// Any non-success HTTP status must surface as `BridgeError::Transport`;
/// implementations never retry.
#[async_trait]
pub trait SandboxTransport: Send + Sync {
    async fn execute(&self, session: &SessionId, code: &str) -> Result<ExecutionResult>;

    async fn upload_file(&self, session: &SessionId, filename: &str, contents: Vec<u8>) -> Result<RemoteFile>;

    async fn download_file(&self, session: &SessionId, remote_path: &str) -> Result<Vec<u8>>;

    async fn list_files(&self, session: &SessionId) -> Result<Vec<RemoteFile>>;
}
