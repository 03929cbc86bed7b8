//! Wire records exchanged with the sandbox relay helper.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use toolbridge_core::{BridgeError, CallId, Result};
use toolbridge_sandbox::ExecutionResult;

/// One tool call written by a stub inside the sandbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    pub id: CallId,
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl CallRecord {
    /// `namespace.name`, as logged and reported back in errors.
    pub fn tool_label(&self) -> String {
        format!("{}.{}", self.namespace, self.name)
    }
}

/// The host's answer to one [`CallRecord`], matched by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub id: CallId,
    pub namespace: String,
    pub name: String,
    pub result: Value,
    pub is_error: bool,
}

impl ResultRecord {
    pub fn success(call: &CallRecord, result: Value) -> Self {
        Self {
            id: call.id.clone(),
            namespace: call.namespace.clone(),
            name: call.name.clone(),
            result,
            is_error: false,
        }
    }

    /// Error-shaped result: `{"error": {"kind": .., "message": ..}}`.
    pub fn failure(call: &CallRecord, error: &BridgeError) -> Self {
        Self {
            id: call.id.clone(),
            namespace: call.namespace.clone(),
            name: call.name.clone(),
            result: json!({"error": {"kind": error.kind(), "message": error.to_string()}}),
            is_error: true,
        }
    }
}

/// Exception raised by the submitted program.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptError {
    #[serde(rename = "type", default)]
    pub error_type: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub traceback: String,
}

/// How the submitted program ended.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinalResult {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub stdout: String,
    #[serde(rename = "stderr", default, deserialize_with = "script_error")]
    pub error: Option<ScriptError>,
    /// Value of the program's last expression
    #[serde(default)]
    pub result: Value,
}

impl FinalResult {
    /// Final result built from a plain execute response.
    pub fn from_execution(execution: &ExecutionResult) -> Self {
        let error = (!execution.stderr.trim().is_empty()).then(|| ScriptError {
            error_type: "stderr".to_string(),
            message: execution.stderr.clone(),
            traceback: String::new(),
        });
        Self {
            stdout: execution.stdout.clone(),
            error,
            result: Value::Null,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn script_error<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<ScriptError>, D::Error> {
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) if text.trim().is_empty() => Ok(None),
        Some(Value::String(text)) => Ok(Some(ScriptError {
            error_type: "stderr".to_string(),
            message: text,
            traceback: String::new(),
        })),
        Some(other) => serde_json::from_value(other).map(Some).map_err(serde::de::Error::custom),
    }
}

/// Envelope returned by every relay submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RelayResponse {
    /// Stubs are blocked on these calls
    Calls { calls: Vec<CallRecord> },
    /// Nothing happened before the relay's wait deadline
    Waiting,
    /// The runner finished
    Final(FinalResult),
}

impl RelayResponse {
    /// Decode the envelope out of an execute response.
    ///
    /// The relay helper returns its envelope as a JSON string; an already
    /// decoded object is accepted too.
    pub fn from_execution(execution: &ExecutionResult) -> Result<Self> {
        if !execution.succeeded() {
            return Err(BridgeError::decode(
                format!("relay submission ended with status '{}'", execution.status),
                raw_output(execution),
            ));
        }
        let envelope = match &execution.result {
            Value::String(text) => serde_json::from_str::<Value>(text)
                .map_err(|e| BridgeError::decode(format!("relay output is not JSON: {}", e), text.clone()))?,
            Value::Object(_) => execution.result.clone(),
            _ => {
                return Err(BridgeError::decode(
                    "relay returned neither calls nor a final result",
                    raw_output(execution),
                ))
            }
        };
        serde_json::from_value(envelope.clone()).map_err(|e| {
            BridgeError::decode(format!("unrecognized relay envelope: {}", e), envelope.to_string())
        })
    }
}

fn raw_output(execution: &ExecutionResult) -> String {
    let mut raw = match &execution.result {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    };
    for stream in [&execution.stdout, &execution.stderr] {
        if !stream.is_empty() {
            if !raw.is_empty() {
                raw.push('\n');
            }
            raw.push_str(stream);
        }
    }
    raw
}

/// One answered call, in dispatch order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolExchange {
    pub iteration: usize,
    pub call: CallRecord,
    pub result: ResultRecord,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn execution(result: Value) -> ExecutionResult {
        ExecutionResult {
            status: "Success".to_string(),
            result,
            ..ExecutionResult::default()
        }
    }

    #[test]
    fn string_envelopes_are_decoded() {
        let text = r#"{"kind":"calls","calls":[{"id":"c1","namespace":"light","name":"changeState","arguments":{"id":"1","isOn":true}}]}"#;
        let response = RelayResponse::from_execution(&execution(Value::String(text.to_string()))).unwrap();
        match response {
            RelayResponse::Calls { calls } => {
                assert_eq!(calls.len(), 1);
                assert_eq!(calls[0].id.as_str(), "c1");
                assert_eq!(calls[0].tool_label(), "light.changeState");
                assert_eq!(calls[0].arguments["isOn"], true);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn final_envelope_carries_script_error() {
        let envelope = json!({
            "kind": "final",
            "stdout": null,
            "stderr": {"type": "ValueError", "message": "bad", "traceback": "  File ..."},
            "result": null
        });
        let response = RelayResponse::from_execution(&execution(envelope)).unwrap();
        let RelayResponse::Final(result) = response else {
            panic!("expected final");
        };
        assert_eq!(result.stdout, "");
        assert!(!result.succeeded());
        assert_eq!(result.error.unwrap().error_type, "ValueError");
    }

    #[test]
    fn waiting_envelope_has_no_payload() {
        let response =
            RelayResponse::from_execution(&execution(Value::String(r#"{"kind":"waiting"}"#.to_string()))).unwrap();
        assert_eq!(response, RelayResponse::Waiting);
    }

    #[test]
    fn garbage_keeps_raw_output() {
        let err = RelayResponse::from_execution(&execution(Value::String("Traceback...".to_string()))).unwrap_err();
        match err {
            BridgeError::Decode { raw, .. } => assert_eq!(raw, "Traceback..."),
            other => panic!("unexpected {:?}", other),
        }

        let mut failed = execution(Value::Null);
        failed.status = "Failed".to_string();
        failed.stderr = "NameError: relay".to_string();
        let err = RelayResponse::from_execution(&failed).unwrap_err();
        assert!(matches!(err, BridgeError::Decode { ref raw, .. } if raw == "NameError: relay"));
    }

    #[test]
    fn failures_are_error_shaped() {
        let call = CallRecord {
            id: CallId::from_external("c9"),
            namespace: "nope".to_string(),
            name: "missing".to_string(),
            arguments: Value::Null,
        };
        let record = ResultRecord::failure(&call, &BridgeError::ToolNotFound("nope.missing".to_string()));
        assert!(record.is_error);
        assert_eq!(record.result["error"]["kind"], "tool_not_found");
        assert_eq!(record.id, call.id);
    }
}
