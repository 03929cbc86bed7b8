//! Session lifecycle over the scripted transport.

use serde_json::json;
use std::sync::Arc;
use test_support::common::LightBoard;
use test_support::support::{light_registry, RecordedRequest, ScriptedReply, ScriptedSandbox};
use toolbridge_core::BridgeError;
use toolbridge_sandbox::{ExecutionResult, SandboxConfig, SandboxSession, SessionState};
use toolbridge_tools::{ToolMetadata, ToolName};

fn session_over(sandbox: &Arc<ScriptedSandbox>) -> SandboxSession {
    SandboxSession::new(SandboxConfig::default(), sandbox.clone()).expect("valid config")
}

fn light_tools() -> Vec<ToolMetadata> {
    let board = LightBoard::with_lights(&["kitchen"]);
    light_registry(&board).expect("fixture registry").list_tools()
}

#[tokio::test]
async fn initialize_uploads_and_moves_helpers_once() {
    let sandbox = Arc::new(ScriptedSandbox::new());
    let mut session = session_over(&sandbox);
    assert_eq!(session.state(), SessionState::Uninitialized);

    session.initialize().await.expect("initialize");
    assert_eq!(session.state(), SessionState::Ready);

    let uploaded: Vec<String> = sandbox
        .uploaded_files()
        .into_iter()
        .map(|(filename, _)| filename)
        .collect();
    assert_eq!(uploaded, vec!["bridge_config.py", "channel.py", "relay.py", "runner.py"]);

    let code = sandbox.executed_code();
    assert!(code[0].contains("os.makedirs"));
    assert!(code.iter().any(|c| c.contains("/mnt/data/scripts/modules/channel.py")));
    assert!(code.iter().any(|c| c.contains("/mnt/data/scripts/runner.py")));

    let requests_before = sandbox.requests().len();
    session.initialize().await.expect("second initialize");
    assert_eq!(sandbox.requests().len(), requests_before);
}

#[tokio::test]
async fn failed_setup_leaves_session_uninitialized() {
    let sandbox = Arc::new(ScriptedSandbox::new());
    sandbox.fail_next_execute(ScriptedReply::Raw(ExecutionResult {
        status: "Failed".to_string(),
        stderr: "PermissionError".to_string(),
        ..ExecutionResult::default()
    }));
    let mut session = session_over(&sandbox);

    let err = session.initialize().await.expect_err("setup fails");
    assert!(matches!(err, BridgeError::SessionState(ref message) if message.contains("PermissionError")));
    assert_eq!(session.state(), SessionState::Uninitialized);

    session.initialize().await.expect("retry succeeds");
    assert_eq!(session.state(), SessionState::Ready);
}

#[tokio::test]
async fn tool_modules_are_uploaded_as_deltas() {
    let sandbox = Arc::new(ScriptedSandbox::new());
    let mut session = session_over(&sandbox);
    let tools = light_tools();
    let (first_batch, second_batch) = tools.split_at(2);

    let first = session
        .ensure_tools_uploaded(first_batch)
        .await
        .expect("first upload")
        .expect("new module");
    assert_eq!(first.module, "tools_v1");
    assert_eq!(first.filename, "tools_v1.py");
    assert_eq!(first.tools.len(), 2);

    let again = session.ensure_tools_uploaded(first_batch).await.expect("no-op upload");
    assert!(again.is_none());

    let second = session
        .ensure_tools_uploaded(&tools)
        .await
        .expect("second upload")
        .expect("delta module");
    assert_eq!(second.module, "tools_v2");
    assert_eq!(second.tools, vec![second_batch[0].name.clone()]);
    assert_eq!(session.module_version(), 2);
    assert!(session.has_tool(&ToolName::parse("light.getLights").expect("name")));

    let (_, contents) = sandbox
        .uploaded_files()
        .into_iter()
        .find(|(filename, _)| filename == "tools_v2.py")
        .expect("tools_v2 uploaded");
    let source = String::from_utf8(contents).expect("utf-8 module");
    assert!(source.contains("# mode: execution"));
    assert!(source.contains("def light__getLights("));
    assert!(!source.contains("def light__changeState("));

    assert_eq!(
        session.prelude(),
        "from modules.tools_v1 import *\nfrom modules.tools_v2 import *\n"
    );
}

#[tokio::test]
async fn later_modules_do_not_rebind_earlier_record_classes() {
    let sandbox = Arc::new(ScriptedSandbox::new());
    let mut session = session_over(&sandbox);
    let point_tool = |local: &str, field: serde_json::Value| {
        ToolMetadata::new(
            ToolName::parse(&format!("geo.{}", local)).expect("name"),
            "",
            serde_json::Value::Null,
            json!({"type": "object", "properties": {"point": {"type": "object", "properties": field}}}),
        )
    };

    session
        .ensure_tools_uploaded(&[point_tool("a", json!({"x": {"type": "integer"}}))])
        .await
        .expect("first upload");
    session
        .ensure_tools_uploaded(&[point_tool("b", json!({"y": {"type": "string"}}))])
        .await
        .expect("second upload");

    let module_source = |name: &str| {
        let (_, contents) = sandbox
            .uploaded_files()
            .into_iter()
            .find(|(filename, _)| filename == name)
            .expect("module uploaded");
        String::from_utf8(contents).expect("utf-8 module")
    };
    assert!(module_source("tools_v1.py").contains("class Geo__point:"));
    let second = module_source("tools_v2.py");
    assert!(second.contains("class Geo__point_2:"));
    assert!(!second.contains("class Geo__point:"));
}

#[tokio::test]
async fn unusable_tools_are_not_marked_uploaded() {
    let sandbox = Arc::new(ScriptedSandbox::new());
    let mut session = session_over(&sandbox);
    let broken = ToolMetadata::new(
        ToolName::parse("light.broken").expect("name"),
        "",
        json!({"type": "object", "properties": {"x": {"$ref": "#/$defs/Missing"}}}),
        serde_json::Value::Null,
    );

    let uploaded = session
        .ensure_tools_uploaded(std::slice::from_ref(&broken))
        .await
        .expect("skip is not an error");
    assert!(uploaded.is_none());
    assert!(!session.has_tool(&broken.name));
    assert_eq!(session.prelude(), "");
}

#[tokio::test]
async fn downloads_are_written_locally() {
    let sandbox = Arc::new(ScriptedSandbox::new());
    sandbox.put_file("/mnt/data/report.csv", b"a,b\n1,2\n");
    let session = session_over(&sandbox);
    let dir = tempfile::tempdir().expect("temp dir");
    let local = dir.path().join("report.csv");

    let written = session
        .download_file_to("/mnt/data/report.csv", &local)
        .await
        .expect("download");
    assert_eq!(written, 8);
    assert_eq!(std::fs::read(&local).expect("local file"), b"a,b\n1,2\n");

    let missing = session.download_file("/mnt/data/missing.txt").await;
    assert!(matches!(missing, Err(BridgeError::Transport { status: 404, .. })));
    assert!(sandbox
        .requests()
        .contains(&RecordedRequest::Download("/mnt/data/missing.txt".to_string())));
}

#[tokio::test]
async fn upload_without_folder_skips_the_move() {
    let sandbox = Arc::new(ScriptedSandbox::new());
    let session = session_over(&sandbox);

    let remote = session
        .upload_file("data.json", b"{}".to_vec(), None)
        .await
        .expect("upload");
    assert_eq!(remote.filename, "data.json");
    assert_eq!(remote.full_path, None);
    assert!(sandbox.executed_code().is_empty());

    let moved = session
        .upload_file("data.json", b"{}".to_vec(), Some("/mnt/data/inputs"))
        .await
        .expect("upload into folder");
    assert_eq!(moved.full_path.as_deref(), Some("/mnt/data/inputs/data.json"));
    assert_eq!(sandbox.executed_code().len(), 1);
}
