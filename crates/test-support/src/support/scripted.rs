//! In-memory [`SandboxTransport`] that replays scripted relay envelopes.
//!
//! Setup and file-move executions always succeed. Every submission that calls
//! into the relay helper consumes the next scripted reply; once the script is
//! exhausted the sandbox reports a final envelope with empty output.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use toolbridge_core::{BridgeError, Result, SessionId};
use toolbridge_sandbox::{ExecutionResult, RemoteFile, SandboxTransport};

const RELAY_MARKER: &str = "_toolbridge_relay.relay(";

#[derive(Debug, Clone, PartialEq)]
pub enum RecordedRequest {
    Execute(String),
    Upload { filename: String, contents: Vec<u8> },
    Download(String),
    ListFiles,
}

#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Returned the way the relay helper returns it: as a JSON string result
    Envelope(Value),
    /// Returned verbatim
    Raw(ExecutionResult),
    /// Fails the request with a transport error
    HttpStatus(u16, String),
}

#[derive(Default)]
pub struct ScriptedSandbox {
    requests: Mutex<Vec<RecordedRequest>>,
    replies: Mutex<VecDeque<ScriptedReply>>,
    files: Mutex<HashMap<String, Vec<u8>>>,
    fail_next_execute: Mutex<Option<ScriptedReply>>,
}

impl ScriptedSandbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_reply(&self, reply: ScriptedReply) -> &Self {
        self.replies.lock().expect("replies lock").push_back(reply);
        self
    }

    /// Queue a batch of calls. Each call is `(id, "ns.fn", arguments)`.
    pub fn push_calls(&self, calls: &[(&str, &str, Value)]) -> &Self {
        let calls: Vec<Value> = calls
            .iter()
            .map(|(id, tool, arguments)| {
                let (namespace, name) = tool.split_once('.').unwrap_or(("", tool));
                json!({"id": id, "namespace": namespace, "name": name, "arguments": arguments})
            })
            .collect();
        self.push_reply(ScriptedReply::Envelope(json!({"kind": "calls", "calls": calls})))
    }

    pub fn push_final(&self, stdout: &str, result: Value) -> &Self {
        self.push_reply(ScriptedReply::Envelope(
            json!({"kind": "final", "stdout": stdout, "stderr": "", "result": result}),
        ))
    }

    pub fn push_waiting(&self) -> &Self {
        self.push_reply(ScriptedReply::Envelope(json!({"kind": "waiting"})))
    }

    /// The next execute of any kind fails or returns `reply`.
    pub fn fail_next_execute(&self, reply: ScriptedReply) {
        *self.fail_next_execute.lock().expect("failure lock") = Some(reply);
    }

    pub fn put_file(&self, path: &str, contents: &[u8]) {
        self.files
            .lock()
            .expect("files lock")
            .insert(path.to_string(), contents.to_vec());
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub fn executed_code(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter_map(|request| match request {
                RecordedRequest::Execute(code) => Some(code),
                _ => None,
            })
            .collect()
    }

    /// Executions that entered the relay helper, in order.
    pub fn relay_submissions(&self) -> Vec<String> {
        self.executed_code()
            .into_iter()
            .filter(|code| code.contains(RELAY_MARKER))
            .collect()
    }

    pub fn uploaded_files(&self) -> Vec<(String, Vec<u8>)> {
        self.requests()
            .into_iter()
            .filter_map(|request| match request {
                RecordedRequest::Upload { filename, contents } => Some((filename, contents)),
                _ => None,
            })
            .collect()
    }

    pub fn remaining_replies(&self) -> usize {
        self.replies.lock().expect("replies lock").len()
    }

    fn record(&self, request: RecordedRequest) {
        self.requests.lock().expect("requests lock").push(request);
    }

    fn next_reply(&self) -> ScriptedReply {
        self.replies
            .lock()
            .expect("replies lock")
            .pop_front()
            .unwrap_or_else(|| {
                ScriptedReply::Envelope(json!({"kind": "final", "stdout": "", "stderr": "", "result": null}))
            })
    }
}

/// Result records carried by a relay submission, or `None` for the launch.
pub fn pending_results_of(code: &str) -> Option<Value> {
    let start = code.find("json.loads(")? + "json.loads(".len();
    let end = code.rfind("))")?;
    let literal: String = serde_json::from_str(code.get(start..end)?).ok()?;
    serde_json::from_str(&literal).ok()
}

fn success(result: Value) -> ExecutionResult {
    ExecutionResult {
        status: "Success".to_string(),
        result,
        ..ExecutionResult::default()
    }
}

fn into_execution(reply: ScriptedReply) -> Result<ExecutionResult> {
    match reply {
        ScriptedReply::Envelope(envelope) => Ok(success(Value::String(envelope.to_string()))),
        ScriptedReply::Raw(result) => Ok(result),
        ScriptedReply::HttpStatus(status, body) => Err(BridgeError::Transport {
            operation: "execute".to_string(),
            status,
            body,
        }),
    }
}

#[async_trait]
impl SandboxTransport for ScriptedSandbox {
    async fn execute(&self, _session: &SessionId, code: &str) -> Result<ExecutionResult> {
        self.record(RecordedRequest::Execute(code.to_string()));
        if let Some(reply) = self.fail_next_execute.lock().expect("failure lock").take() {
            return into_execution(reply);
        }
        if code.contains(RELAY_MARKER) {
            return into_execution(self.next_reply());
        }
        Ok(success(Value::String("ready".to_string())))
    }

    async fn upload_file(&self, _session: &SessionId, filename: &str, contents: Vec<u8>) -> Result<RemoteFile> {
        self.record(RecordedRequest::Upload {
            filename: filename.to_string(),
            contents: contents.clone(),
        });
        let bytes = contents.len() as u64;
        self.put_file(filename, &contents);
        Ok(RemoteFile {
            filename: filename.to_string(),
            bytes: Some(bytes),
            ..RemoteFile::default()
        })
    }

    async fn download_file(&self, _session: &SessionId, remote_path: &str) -> Result<Vec<u8>> {
        self.record(RecordedRequest::Download(remote_path.to_string()));
        self.files
            .lock()
            .expect("files lock")
            .get(remote_path)
            .cloned()
            .ok_or_else(|| BridgeError::Transport {
                operation: "downloadFile".to_string(),
                status: 404,
                body: format!("{} not found", remote_path),
            })
    }

    async fn list_files(&self, _session: &SessionId) -> Result<Vec<RemoteFile>> {
        self.record(RecordedRequest::ListFiles);
        let mut files: Vec<RemoteFile> = self
            .files
            .lock()
            .expect("files lock")
            .iter()
            .map(|(name, contents)| RemoteFile {
                filename: name.clone(),
                bytes: Some(contents.len() as u64),
                ..RemoteFile::default()
            })
            .collect();
        files.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(files)
    }
}
