//! Python snippets and helper modules submitted to the sandbox.

use crate::config::SandboxConfig;
use crate::layout;
use genco::lang::python;
use genco::prelude::*;
use serde_json::Value;
use std::time::Duration;
use toolbridge_core::{BridgeError, Result};

pub const CHANNEL_MODULE_SOURCE: &str = include_str!("../assets/channel.py");
pub const RELAY_MODULE_SOURCE: &str = include_str!("../assets/relay.py");
pub const RUNNER_SCRIPT_SOURCE: &str = include_str!("../assets/runner.py");
pub const SETUP_SNIPPET: &str = include_str!("../assets/setup_env.py");

pub const BRIDGE_CONFIG_FILE: &str = "bridge_config.py";
pub const CHANNEL_FILE: &str = "channel.py";
pub const RELAY_FILE: &str = "relay.py";
pub const RUNNER_FILE: &str = "runner.py";

/// A fixed file uploaded during session initialization.
#[derive(Debug, Clone)]
pub struct HelperFile {
    pub filename: &'static str,
    pub folder: &'static str,
    pub contents: String,
}

/// All helper files in upload order; `bridge_config.py` first since the
/// others import it.
pub fn helper_files(config: &SandboxConfig) -> Result<Vec<HelperFile>> {
    Ok(vec![
        HelperFile {
            filename: BRIDGE_CONFIG_FILE,
            folder: layout::MODULES_DIR,
            contents: render_bridge_config(config)?,
        },
        HelperFile {
            filename: CHANNEL_FILE,
            folder: layout::MODULES_DIR,
            contents: CHANNEL_MODULE_SOURCE.to_string(),
        },
        HelperFile {
            filename: RELAY_FILE,
            folder: layout::MODULES_DIR,
            contents: RELAY_MODULE_SOURCE.to_string(),
        },
        HelperFile {
            filename: RUNNER_FILE,
            folder: layout::SCRIPTS_DIR,
            contents: RUNNER_SCRIPT_SOURCE.to_string(),
        },
    ])
}

fn line(tokens: &mut python::Tokens, text: impl AsRef<str>) {
    let text = text.as_ref();
    quote_in!(*tokens => $(text));
    tokens.push();
}

/// Python string literal. JSON string escapes are a subset of Python's.
pub fn py_string(text: &str) -> String {
    Value::String(text.to_string()).to_string()
}

fn seconds(duration: Duration) -> String {
    format!("{:?}", duration.as_secs_f64())
}

/// Constants shared by the channel, relay and runner modules.
pub fn render_bridge_config(config: &SandboxConfig) -> Result<String> {
    let mut tokens = python::Tokens::new();
    line(&mut tokens, "# Sandbox bridge settings");
    line(&mut tokens, "# This file is auto-generated - do not edit manually");
    tokens.line();
    for (name, path) in [
        ("SCRIPTS_DIR", layout::SCRIPTS_DIR),
        ("MODULES_DIR", layout::MODULES_DIR),
        ("IO_DIR", layout::IO_DIR),
        ("RESULTS_DIR", layout::RESULTS_DIR),
        ("CALLS_FILE", layout::CALLS_FILE),
        ("OFFSET_FILE", layout::OFFSET_FILE),
        ("TERMINATION_FILE", layout::TERMINATION_FILE),
        ("RUNNER_PID_FILE", layout::RUNNER_PID_FILE),
        ("MAIN_SCRIPT", layout::MAIN_SCRIPT),
        ("RUNNER_SCRIPT", layout::RUNNER_SCRIPT),
    ] {
        line(&mut tokens, format!("{} = {}", name, py_string(path)));
    }
    tokens.line();
    for (name, duration) in [
        ("POLL_INTERVAL_SECONDS", config.channel.poll_interval),
        ("CALL_TIMEOUT_SECONDS", config.channel.call_timeout),
        ("BATCH_WINDOW_SECONDS", config.batch_window),
        ("RELAY_WAIT_SECONDS", config.relay_wait),
    ] {
        line(&mut tokens, format!("{} = {}", name, seconds(duration)));
    }
    tokens
        .to_file_string()
        .map_err(|e| BridgeError::Codegen(format!("Python render error: {}", e)))
}

/// Move an uploaded file from the upload folder into `folder`.
pub fn move_file_snippet(filename: &str, folder: &str) -> String {
    let source = layout::uploaded_path(filename);
    let target = format!("{}/{}", folder.trim_end_matches('/'), filename);
    format!(
        "import os\nimport shutil\nos.makedirs({folder}, exist_ok=True)\nshutil.move({source}, {target})\n{target}\n",
        folder = py_string(folder),
        source = py_string(&source),
        target = py_string(&target),
    )
}

fn relay_import() -> String {
    format!(
        "import json\nimport sys\nif {scripts} not in sys.path:\n    sys.path.append({scripts})\nfrom modules import relay as _toolbridge_relay\n",
        scripts = py_string(layout::SCRIPTS_DIR),
    )
}

/// Write `code` as main.py, restart the runner and wait for its first calls.
pub fn launch_snippet(code: &str) -> String {
    format!(
        "{import}with open({main}, \"w\", encoding=\"utf-8\") as _toolbridge_handle:\n    _toolbridge_handle.write({code})\n_toolbridge_relay.launch()\n_toolbridge_relay.relay([])\n",
        import = relay_import(),
        main = py_string(layout::MAIN_SCRIPT),
        code = py_string(code),
    )
}

/// Deliver `results` (a JSON array of result records) and wait for more calls.
pub fn relay_snippet(results: &Value) -> String {
    format!(
        "{import}_toolbridge_relay.relay(json.loads({results}))\n",
        import = relay_import(),
        results = py_string(&results.to_string()),
    )
}
