//! Fixed file layout inside the remote sandbox.

/// Where `uploadFile` places files before they are moved.
pub const UPLOAD_DIR: &str = "/mnt/data";
pub const SCRIPTS_DIR: &str = "/mnt/data/scripts";
pub const MODULES_DIR: &str = "/mnt/data/scripts/modules";
pub const IO_DIR: &str = "/mnt/data/scripts/io";
pub const RESULTS_DIR: &str = "/mnt/data/scripts/io/function_results";

/// Append-only JSON lines written by the stubs, one call record per line.
pub const CALLS_FILE: &str = "/mnt/data/scripts/io/function_calls.jsonl";
/// Byte offset of the first call record the relay has not yet returned.
pub const OFFSET_FILE: &str = "/mnt/data/scripts/io/last_function_call.txt";
pub const TERMINATION_FILE: &str = "/mnt/data/scripts/io/termination.json";
pub const RUNNER_PID_FILE: &str = "/mnt/data/scripts/io/runner.pid";

pub const MAIN_SCRIPT: &str = "/mnt/data/scripts/main.py";
pub const RUNNER_SCRIPT: &str = "/mnt/data/scripts/runner.py";

pub fn uploaded_path(filename: &str) -> String {
    format!("{}/{}", UPLOAD_DIR, filename)
}
