//! Schema helpers for typed tools.

use schemars::JsonSchema;
use serde_json::Value;

/// JSON Schema of a Rust type, as emitted by `schemars`.
pub fn json_schema_value<T: JsonSchema>() -> Value {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(&schema).unwrap_or(Value::Null)
}
