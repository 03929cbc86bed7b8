//! A model turn from generated code to the streamed run events.

use futures_util::stream::{self, StreamExt};
use serde_json::{json, Value};
use std::sync::Arc;
use test_support::common::LightBoard;
use test_support::support::{light_registry, ScriptedSandbox};
use toolbridge::prelude::*;
use toolbridge::stream::{parse_frames, Role};

struct Turn {
    board: LightBoard,
    sandbox: Arc<ScriptedSandbox>,
    session: SandboxSession,
    relay: CorrelationLoop,
}

fn turn() -> Turn {
    let board = LightBoard::with_lights(&["kitchen", "porch"]);
    let registry = light_registry(&board).expect("fixture registry");
    let sandbox = Arc::new(ScriptedSandbox::new());
    let session = SandboxSession::new(SandboxConfig::default(), sandbox.clone()).expect("session");
    Turn {
        board,
        sandbox,
        session,
        relay: CorrelationLoop::new(Arc::new(registry)),
    }
}

#[tokio::test]
async fn tool_calls_and_reply_stream_as_one_run() {
    let mut turn = turn();
    turn.sandbox
        .push_calls(&[
            ("c1", "light.changeState", json!({"id": "kitchen", "isOn": true})),
            ("c2", "light.getLights", json!({})),
        ])
        .push_final("", Value::Null);

    let code = "light.changeState(id=\"kitchen\", isOn=True)\nlight.getLights()";
    let outcome = turn
        .relay
        .run(&mut turn.session, code, &CancellationFlag::new())
        .await
        .expect("relay finishes");
    assert_eq!(turn.board.get("kitchen"), Some(true));
    assert_eq!(outcome.exchanges.len(), 2);

    let store = Arc::new(InMemoryConversationStore::default());
    let driver = RunDriver::new(store.clone());
    let thread = ThreadId::from_external("thread_1");
    let reply = MessageId::from_external("m1");
    let inputs = vec![
        Ok(RunInput::from(&outcome)),
        Ok(RunInput::Chunk(MessageChunk::delta(reply.clone(), "The kitchen "))),
        Ok(RunInput::Chunk(MessageChunk::last(reply, "light is on."))),
    ];
    let events: Vec<RunEvent> = driver
        .stream_run(thread.clone(), move |_| stream::iter(inputs))
        .collect()
        .await;

    let names: Vec<&str> = events.iter().map(RunEvent::name).collect();
    assert_eq!(names.first(), Some(&"thread.run.created"));
    assert_eq!(&names[names.len() - 3..], &["thread.run.step.completed", "thread.run.completed", "done"]);
    assert_eq!(names.iter().filter(|name| **name == "thread.message.completed").count(), 3);

    let stored = store.messages(&thread).await.expect("stored messages");
    let roles: Vec<Role> = stored.iter().map(|message| message.role).collect();
    assert_eq!(roles, vec![Role::Tool, Role::Tool, Role::Assistant]);
    assert_eq!(stored[2].text(), "The kitchen light is on.");
}

#[tokio::test]
async fn sandbox_outage_surfaces_as_a_failed_run() {
    let mut turn = turn();
    turn.sandbox.push_reply(test_support::support::ScriptedReply::HttpStatus(502, "bad gateway".to_string()));

    let relay_error = turn
        .relay
        .run(&mut turn.session, "light.getLights()", &CancellationFlag::new())
        .await
        .expect_err("transport failures are fatal");
    assert_eq!(relay_error.kind(), "transport");

    let driver = RunDriver::new(Arc::new(InMemoryConversationStore::default()));
    let frames: Vec<String> = driver
        .stream_sse(ThreadId::from_external("thread_2"), move |_| {
            stream::iter(vec![Err::<RunInput, _>(relay_error)])
        })
        .collect()
        .await;
    let parsed = parse_frames(&frames.concat());

    let tail: Vec<&str> = parsed[parsed.len() - 3..].iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(tail, vec!["error", "thread.run.failed", "done"]);
    let failed: Value = serde_json::from_str(&parsed[parsed.len() - 2].1).expect("run json");
    assert_eq!(failed["last_error"]["code"], "transport");
}

#[test]
fn facade_exposes_stub_rendering() {
    let board = LightBoard::with_lights(&["kitchen"]);
    let registry = light_registry(&board).expect("fixture registry");
    let module = toolbridge::tools::render_tool_module(&registry.list_tools(), StubMode::Execution)
        .expect("stubs render");
    assert!(module.source.contains("def light__changeState("));
    assert!(module.skipped.is_empty());
}
