//! One remote interpreter session and the tool modules uploaded into it.

use crate::config::SandboxConfig;
use crate::http::HttpSandboxTransport;
use crate::layout;
use crate::scripts::{self, move_file_snippet};
use crate::transport::{ExecutionResult, RemoteFile, SandboxTransport};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use toolbridge_core::context::with_session_id;
use toolbridge_core::{BridgeError, Result, SessionId};
use toolbridge_observability::spans;
use toolbridge_tools::{render_delta_module, StubMode, ToolMetadata, ToolName};
use tracing::Instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initializing,
    Ready,
}

/// A stub module living in the session's modules folder.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedModule {
    /// Importable name, e.g. `tools_v2`
    pub module: String,
    pub filename: String,
    pub tools: Vec<ToolName>,
}

pub struct SandboxSession {
    config: SandboxConfig,
    transport: Arc<dyn SandboxTransport>,
    state: SessionState,
    uploaded_tools: BTreeSet<ToolName>,
    /// Record classes defined by every uploaded module
    record_names: BTreeSet<String>,
    modules: Vec<UploadedModule>,
}

impl SandboxSession {
    pub fn new(config: SandboxConfig, transport: Arc<dyn SandboxTransport>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            transport,
            state: SessionState::Uninitialized,
            uploaded_tools: BTreeSet::new(),
            record_names: BTreeSet::new(),
            modules: Vec::new(),
        })
    }

    /// Session over the HTTP transport described by `config`.
    pub fn connect(config: SandboxConfig) -> Result<Self> {
        let transport = HttpSandboxTransport::new(&config)?;
        Self::new(config, Arc::new(transport))
    }

    pub fn session_id(&self) -> &SessionId {
        &self.config.session_id
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Number of stub modules uploaded so far.
    pub fn module_version(&self) -> usize {
        self.modules.len()
    }

    pub fn modules(&self) -> &[UploadedModule] {
        &self.modules
    }

    pub fn has_tool(&self, name: &ToolName) -> bool {
        self.uploaded_tools.contains(name)
    }

    /// Prepare the remote folders and helper modules. No-op once ready.
    pub async fn initialize(&mut self) -> Result<()> {
        match self.state {
            SessionState::Ready => return Ok(()),
            SessionState::Initializing => {
                tracing::debug!(session_id = %self.config.session_id, "Restarting abandoned initialization");
            }
            SessionState::Uninitialized => {}
        }

        self.state = SessionState::Initializing;
        let outcome = self.run_setup().await;
        self.state = match outcome {
            Ok(()) => SessionState::Ready,
            Err(_) => SessionState::Uninitialized,
        };
        match &outcome {
            Ok(()) => tracing::info!(session_id = %self.config.session_id, "Sandbox session ready"),
            Err(err) => tracing::warn!(session_id = %self.config.session_id, error = %err, "Sandbox initialization failed"),
        }
        outcome
    }

    async fn run_setup(&self) -> Result<()> {
        let setup = self.execute_raw("setup", scripts::SETUP_SNIPPET).await?;
        ensure_succeeded("environment setup", &setup)?;
        for helper in scripts::helper_files(&self.config)? {
            self.upload_into(helper.filename, helper.contents.into_bytes(), helper.folder)
                .await?;
        }
        Ok(())
    }

    /// Upload execution stubs for tools the session has not seen yet.
    ///
    /// Each call that finds new tools uploads one new module `tools_v{n}.py`;
    /// returns `None` when every tool is already present.
    pub async fn ensure_tools_uploaded(&mut self, tools: &[ToolMetadata]) -> Result<Option<UploadedModule>> {
        self.initialize().await?;

        let delta: Vec<ToolMetadata> = tools
            .iter()
            .filter(|tool| !self.uploaded_tools.contains(&tool.name))
            .cloned()
            .collect();
        if delta.is_empty() {
            return Ok(None);
        }

        let generated = render_delta_module(&delta, StubMode::Execution, &self.record_names)?;
        if generated.functions.is_empty() {
            return Ok(None);
        }

        let module = format!("tools_v{}", self.modules.len() + 1);
        let filename = format!("{}.py", module);
        self.upload_into(&filename, generated.source.into_bytes(), layout::MODULES_DIR)
            .await?;

        self.uploaded_tools.extend(generated.functions.iter().cloned());
        self.record_names.extend(generated.records);
        let uploaded = UploadedModule {
            module,
            filename,
            tools: generated.functions,
        };
        tracing::info!(
            session_id = %self.config.session_id,
            module = uploaded.module.as_str(),
            tools = uploaded.tools.len(),
            skipped = generated.skipped.len(),
            "Uploaded tool stubs"
        );
        self.modules.push(uploaded.clone());
        Ok(Some(uploaded))
    }

    /// Import lines that bring every uploaded stub into scope.
    pub fn prelude(&self) -> String {
        self.modules
            .iter()
            .map(|module| format!("from modules.{} import *\n", module.module))
            .collect()
    }

    pub async fn execute(&self, code: &str) -> Result<ExecutionResult> {
        self.execute_raw("execute", code).await
    }

    async fn execute_raw(&self, operation: &str, code: &str) -> Result<ExecutionResult> {
        with_session_id(self.config.session_id.clone(), async {
            let span = spans::sandbox_execute(self.config.session_id.as_str(), operation);
            async {
                let result = self.transport.execute(&self.config.session_id, code).await?;
                tracing::debug!(
                    status = result.status.as_str(),
                    execution_time_ms = result.execution_time_ms,
                    "Sandbox execution finished"
                );
                Ok::<_, BridgeError>(result)
            }
            .instrument(span)
            .await
        })
        .await
    }

    /// Upload a file; with `target_folder` it is moved there afterwards.
    pub async fn upload_file(
        &self,
        filename: &str,
        contents: Vec<u8>,
        target_folder: Option<&str>,
    ) -> Result<RemoteFile> {
        match target_folder {
            Some(folder) => self.upload_into(filename, contents, folder).await,
            None => self.transport.upload_file(&self.config.session_id, filename, contents).await,
        }
    }

    async fn upload_into(&self, filename: &str, contents: Vec<u8>, folder: &str) -> Result<RemoteFile> {
        let mut remote = self
            .transport
            .upload_file(&self.config.session_id, filename, contents)
            .await?;
        let moved = self
            .execute_raw("move", &move_file_snippet(filename, folder))
            .await?;
        ensure_succeeded(&format!("moving {}", filename), &moved)?;
        remote.full_path = Some(format!("{}/{}", folder.trim_end_matches('/'), filename));
        tracing::debug!(file = filename, folder, "Uploaded file into folder");
        Ok(remote)
    }

    pub async fn download_file(&self, remote_path: &str) -> Result<Vec<u8>> {
        self.transport
            .download_file(&self.config.session_id, remote_path)
            .await
    }

    /// Download `remote_path` into `local`, returning the byte count.
    pub async fn download_file_to(&self, remote_path: &str, local: &Path) -> Result<usize> {
        let bytes = self.download_file(remote_path).await?;
        tokio::fs::write(local, &bytes).await?;
        Ok(bytes.len())
    }

    pub async fn list_files(&self) -> Result<Vec<RemoteFile>> {
        self.transport.list_files(&self.config.session_id).await
    }
}

fn ensure_succeeded(operation: &str, result: &ExecutionResult) -> Result<()> {
    if result.succeeded() {
        return Ok(());
    }
    Err(BridgeError::SessionState(format!(
        "{} failed with status '{}': {}",
        operation, result.status, result.stderr
    )))
}
