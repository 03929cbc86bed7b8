//! Server-sent event framing.

use crate::events::{RunEvent, RunEventKind};

pub const DONE_FRAME: &str = "event: done\ndata: [DONE]\n\n";

/// `event: <name>\ndata: <json>\n\n`; `done` always uses the `[DONE]` sentinel.
pub fn encode_event(event: &RunEvent) -> String {
    if event.kind == RunEventKind::Done {
        return DONE_FRAME.to_string();
    }
    format!("event: {}\ndata: {}\n\n", event.name(), event.data)
}

pub fn encode_events<'a>(events: impl IntoIterator<Item = &'a RunEvent>) -> String {
    events.into_iter().map(encode_event).collect()
}

/// Split a framed stream back into `(event, data)` pairs.
pub fn parse_frames(text: &str) -> Vec<(String, String)> {
    text.split("\n\n")
        .filter(|frame| !frame.trim().is_empty())
        .filter_map(|frame| {
            let mut event = None;
            let mut data = Vec::new();
            for line in frame.lines() {
                if let Some(name) = line.strip_prefix("event: ") {
                    event = Some(name.to_string());
                } else if let Some(payload) = line.strip_prefix("data: ") {
                    data.push(payload);
                }
            }
            event.map(|name| (name, data.join("\n")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn frames_are_named_and_terminated() {
        let events = vec![
            RunEvent {
                kind: RunEventKind::MessageDelta,
                data: json!({"delta": {"text": "Hel"}}),
            },
            RunEvent::error("Previous message was not finished."),
            RunEvent::done(),
        ];
        insta::assert_snapshot!(encode_events(&events), @r###"
        event: thread.message.delta
        data: {"delta":{"text":"Hel"}}

        event: error
        data: {"message":"Previous message was not finished."}

        event: done
        data: [DONE]
        "###);
    }

    #[test]
    fn parse_inverts_encode() {
        let text = encode_events(&[RunEvent::error("boom"), RunEvent::done()]);
        assert_eq!(
            parse_frames(&text),
            vec![
                ("error".to_string(), "{\"message\":\"boom\"}".to_string()),
                ("done".to_string(), "[DONE]".to_string()),
            ]
        );
    }
}
