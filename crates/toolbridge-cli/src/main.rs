//! toolbridge
//!
//! Command-line access to the bridge: render tool stubs from a manifest and
//! drive a sandbox session configured from the environment.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use toolbridge_observability::tracing_setup;
use toolbridge_relay::{CancellationFlag, CorrelationLoop};
use toolbridge_sandbox::{SandboxConfig, SandboxSession};
use toolbridge_tools::{render_tool_module, FunctionFilters, StubMode, ToolMetadata, ToolRegistry};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeChoice {
    Mock,
    Execution,
}

impl From<ModeChoice> for StubMode {
    fn from(choice: ModeChoice) -> Self {
        match choice {
            ModeChoice::Mock => StubMode::Mock,
            ModeChoice::Execution => StubMode::Execution,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "toolbridge")]
#[command(about = "Bridge host tools into a remote Python sandbox", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Render Python stubs for the tools in a manifest.
    Stubs {
        /// JSON file holding a list of tools, or an object with a `tools` list.
        #[arg(long, value_name = "FILE")]
        manifest: PathBuf,

        #[arg(long, value_enum, default_value_t = ModeChoice::Mock)]
        mode: ModeChoice,

        /// Namespaces to leave out.
        #[arg(long = "exclude-namespace", value_name = "NAMESPACE")]
        exclude_namespaces: Vec<String>,

        /// Write the module here instead of stdout.
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
    /// Run a Python file in the sandbox session.
    Exec {
        file: PathBuf,

        /// Submit the file as-is, without the relay runner.
        #[arg(long)]
        raw: bool,
    },
    /// List files stored in the session.
    Files,
    /// Download a session file to a local path.
    Download { remote: String, local: PathBuf },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Manifest {
    Listed(Vec<ToolMetadata>),
    Wrapped { tools: Vec<ToolMetadata> },
}

impl Manifest {
    fn into_tools(self) -> Vec<ToolMetadata> {
        match self {
            Manifest::Listed(tools) | Manifest::Wrapped { tools } => tools,
        }
    }
}

fn load_manifest(path: &Path) -> anyhow::Result<Vec<ToolMetadata>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest {}", path.display()))?;
    let manifest: Manifest = serde_json::from_str(&text)
        .with_context(|| format!("Invalid tool manifest {}", path.display()))?;
    Ok(manifest.into_tools())
}

fn render_stubs(
    manifest: &Path,
    mode: StubMode,
    exclude_namespaces: Vec<String>,
    out: Option<&Path>,
) -> anyhow::Result<()> {
    let filters = FunctionFilters::new().with_excluded_namespaces(exclude_namespaces);
    let tools: Vec<ToolMetadata> = load_manifest(manifest)?
        .into_iter()
        .filter(|tool| filters.allows(&tool.name))
        .collect();
    let module = render_tool_module(&tools, mode).context("Stub generation failed")?;

    for skipped in &module.skipped {
        warn!(tool = %skipped.name, reason = %skipped.reason, "Tool skipped");
        eprintln!("skipped {}: {}", skipped.name, skipped.reason);
    }
    match out {
        Some(path) => {
            std::fs::write(path, &module.source)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), functions = module.functions.len(), "Stub module written");
        }
        None => print!("{}", module.source),
    }
    Ok(())
}

fn connect() -> anyhow::Result<SandboxSession> {
    let config = SandboxConfig::from_env().context("Sandbox configuration")?;
    info!(session_id = %config.session_id, endpoint = %config.endpoint, "Connecting to sandbox");
    Ok(SandboxSession::connect(config)?)
}

async fn exec(file: &Path, raw: bool) -> anyhow::Result<()> {
    let code = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let mut session = connect()?;

    if raw {
        let result = session.execute(&code).await.context("Execution failed")?;
        print!("{}", result.stdout);
        eprint!("{}", result.stderr);
        println!("{}", serde_json::to_string_pretty(&result.result)?);
        return Ok(());
    }

    let relay = CorrelationLoop::new(Arc::new(ToolRegistry::new()));
    let outcome = relay
        .run(&mut session, &code, &CancellationFlag::new())
        .await
        .context("Relay run failed")?;
    print!("{}", outcome.result.stdout);
    if let Some(error) = &outcome.result.error {
        eprintln!("{}: {}", error.error_type, error.message);
    }
    println!("{}", serde_json::to_string_pretty(&outcome.result.result)?);
    info!(iterations = outcome.iterations, "Relay run finished");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_setup::init_tracing_with_default("warn");

    match Cli::parse().command {
        Command::Stubs {
            manifest,
            mode,
            exclude_namespaces,
            out,
        } => render_stubs(&manifest, mode.into(), exclude_namespaces, out.as_deref())?,
        Command::Exec { file, raw } => exec(&file, raw).await?,
        Command::Files => {
            let files = connect()?.list_files().await.context("Listing files failed")?;
            for file in files {
                let size = file.bytes.map(|bytes| bytes.to_string()).unwrap_or_default();
                println!("{}\t{}", file.filename, size);
            }
        }
        Command::Download { remote, local } => {
            let written = connect()?
                .download_file_to(&remote, &local)
                .await
                .with_context(|| format!("Failed to download {}", remote))?;
            println!("{} bytes written to {}", written, local.display());
        }
    }
    Ok(())
}
