//! Dispatch of call batches to host tools.

use crate::records::{CallRecord, ResultRecord};
use futures_util::future::join_all;
use toolbridge_observability::spans;
use toolbridge_tools::ToolRegistry;
use tracing::Instrument;

/// Invoke one call. Every outcome, including an unknown tool, becomes a result.
pub async fn dispatch_call(registry: &ToolRegistry, call: &CallRecord) -> ResultRecord {
    let span = spans::tool_dispatch(call.id.as_str(), &call.tool_label());
    async {
        match registry
            .invoke(&call.namespace, &call.name, call.arguments.clone())
            .await
        {
            Ok(value) => {
                tracing::debug!("Tool call succeeded");
                ResultRecord::success(call, value)
            }
            Err(err) => {
                tracing::warn!(error = %err, kind = err.kind(), "Tool call failed");
                ResultRecord::failure(call, &err)
            }
        }
    }
    .instrument(span)
    .await
}

/// Answer a whole batch. Results come back in call order either way.
pub async fn dispatch_batch(registry: &ToolRegistry, calls: &[CallRecord], concurrent: bool) -> Vec<ResultRecord> {
    if concurrent {
        return join_all(calls.iter().map(|call| dispatch_call(registry, call))).await;
    }
    let mut results = Vec::with_capacity(calls.len());
    for call in calls {
        results.push(dispatch_call(registry, call).await);
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use toolbridge_core::CallId;
    use toolbridge_tools::{ToolMetadata, ToolName};
    use tracing_test::traced_test;

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry
            .register_fn(
                ToolMetadata::new(
                    ToolName::parse("math.double").unwrap(),
                    "Doubles a number",
                    json!({"type": "object", "properties": {"n": {"type": "integer"}}, "required": ["n"]}),
                    json!({"type": "integer"}),
                ),
                |args: Value| async move {
                    let n = args["n"].as_i64().unwrap_or_default();
                    Ok(json!(n * 2))
                },
            )
            .unwrap();
        registry
    }

    fn call(id: &str, namespace: &str, name: &str, arguments: Value) -> CallRecord {
        CallRecord {
            id: CallId::from_external(id),
            namespace: namespace.to_string(),
            name: name.to_string(),
            arguments,
        }
    }

    #[test]
    fn every_call_gets_exactly_one_result() {
        let registry = registry();
        let calls = vec![
            call("a", "math", "double", json!({"n": 21})),
            call("b", "math", "triple", json!({"n": 1})),
            call("c", "bad__ns", "double", json!({})),
        ];
        let results = tokio_test::block_on(dispatch_batch(&registry, &calls, true));
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].result, json!(42));
        assert!(!results[0].is_error);
        assert!(results[1].is_error);
        assert!(results[2].is_error);
        assert_eq!(results[2].result["error"]["kind"], "tool_not_found");
        let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[traced_test]
    #[test]
    fn failures_are_logged() {
        let registry = registry();
        let result = tokio_test::block_on(dispatch_call(&registry, &call("x", "nope", "missing", Value::Null)));
        assert!(result.is_error);
        assert!(logs_contain("Tool call failed"));
    }
}
