//! Host tool registration system
//!
//! Tools are host-side functions described by JSON Schema. The sandbox never
//! reaches them directly: generated stubs write call records that the relay
//! loop dispatches through [`ToolRegistry::invoke`].

use crate::filters::FunctionFilters;
use crate::namespaces::NamespaceType;
use crate::tool_schema::json_schema_value;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use toolbridge_core::{BridgeError, Result};

/// Separator between namespace and function in sandbox-visible names.
pub const NAME_DELIMITER: &str = "__";

fn validate_identifier(kind: &str, name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let valid_rest = name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid_start || !valid_rest {
        return Err(BridgeError::InvalidArgument(format!(
            "{} '{}' must be a non-empty identifier of ASCII letters, digits and '_'",
            kind, name
        )));
    }
    if name.contains(NAME_DELIMITER) {
        return Err(BridgeError::InvalidArgument(format!(
            "{} '{}' must not contain the '{}' delimiter",
            kind, name, NAME_DELIMITER
        )));
    }
    Ok(())
}

macro_rules! define_name_type {
    ($(#[$doc:meta])* $name:ident, $kind:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(String);

        impl $name {
            pub fn new(name: impl Into<String>) -> Result<Self> {
                let name = name.into();
                validate_identifier($kind, &name)?;
                Ok(Self(name))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let name = String::deserialize(deserializer)?;
                $name::new(name).map_err(serde::de::Error::custom)
            }
        }

        impl TryFrom<String> for $name {
            type Error = BridgeError;

            fn try_from(value: String) -> Result<Self> {
                $name::new(value)
            }
        }
    };
}

define_name_type!(
    /// Tool namespace (a "plugin" in prompt terms), e.g. `light`.
    Namespace,
    "Namespace"
);
define_name_type!(
    /// Function name inside a namespace, e.g. `changeState`.
    LocalToolName,
    "Tool name"
);

/// Fully qualified tool name. Displayed and parsed as `namespace.name`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ToolName {
    namespace: Namespace,
    local: LocalToolName,
}

impl ToolName {
    pub fn parse(name: &str) -> Result<Self> {
        let parts: Vec<&str> = name.split('.').collect();
        if parts.len() != 2 {
            return Err(BridgeError::InvalidArgument(format!(
                "Tool name '{}' must be formatted as namespace.name",
                name
            )));
        }
        Ok(Self {
            namespace: Namespace::new(parts[0])?,
            local: LocalToolName::new(parts[1])?,
        })
    }

    pub fn new(namespace: &str, local: &str) -> Result<Self> {
        Ok(Self {
            namespace: Namespace::new(namespace)?,
            local: LocalToolName::new(local)?,
        })
    }

    pub fn qualified(namespace: Namespace, local: LocalToolName) -> Self {
        Self { namespace, local }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn local(&self) -> &LocalToolName {
        &self.local
    }

    /// Sandbox-visible function name, `namespace__name`.
    pub fn canonical(&self) -> String {
        format!("{}{}{}", self.namespace, NAME_DELIMITER, self.local)
    }
}

impl std::fmt::Display for ToolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.namespace, self.local)
    }
}

impl Serialize for ToolName {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ToolName {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let name = String::deserialize(deserializer)?;
        ToolName::parse(&name).map_err(serde::de::Error::custom)
    }
}

/// Metadata describing a host tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolMetadata {
    /// Unique `namespace.name`
    pub name: ToolName,
    /// Used by the model to decide when to call the tool
    #[serde(default)]
    pub description: String,
    /// JSON Schema of the argument object
    #[serde(rename = "parameters", default)]
    pub parameter_schema: Value,
    /// JSON Schema of the result
    #[serde(rename = "returns", default)]
    pub return_schema: Value,
}

impl ToolMetadata {
    pub fn new(
        name: ToolName,
        description: impl Into<String>,
        parameter_schema: Value,
        return_schema: Value,
    ) -> Self {
        Self {
            name,
            description: description.into(),
            parameter_schema,
            return_schema,
        }
    }

    pub fn namespace(&self) -> &Namespace {
        self.name.namespace()
    }
}

/// Trait for typed host tools
///
/// # Example
/// ```rust,no_run
/// use async_trait::async_trait;
/// use schemars::JsonSchema;
/// use serde::{Deserialize, Serialize};
/// use toolbridge_tools::{HostTool, namespaces::NamespaceType};
///
/// struct Light;
/// impl NamespaceType for Light {
///     const NAME: &'static str = "light";
///     fn description() -> &'static str { "Smart lighting" }
/// }
///
/// #[derive(Deserialize, JsonSchema)]
/// struct ChangeStateInput { id: String, #[serde(rename = "isOn")] is_on: bool }
///
/// #[derive(Serialize, JsonSchema)]
/// struct ChangeStateOutput { ok: bool }
///
/// struct ChangeState;
///
/// #[async_trait]
/// impl HostTool for ChangeState {
///     type Namespace = Light;
///     const LOCAL_NAME: &'static str = "changeState";
///     type Input = ChangeStateInput;
///     type Output = ChangeStateOutput;
///
///     fn description(&self) -> &'static str { "Turns a light on or off" }
///
///     async fn execute(&self, _args: Self::Input) -> toolbridge_core::Result<Self::Output> {
///         Ok(ChangeStateOutput { ok: true })
///     }
/// }
/// ```
#[async_trait]
pub trait HostTool: Send + Sync + 'static {
    /// The namespace type this tool belongs to
    type Namespace: NamespaceType;

    /// Local function name; the qualified name is `{Namespace::NAME}.{LOCAL_NAME}`
    const LOCAL_NAME: &'static str;

    type Input: JsonSchema + DeserializeOwned + Send;

    type Output: JsonSchema + Serialize + Send;

    fn name() -> String {
        format!("{}.{}", <Self::Namespace as NamespaceType>::NAME, Self::LOCAL_NAME)
    }

    fn description(&self) -> &'static str;

    fn parameter_schema(&self) -> Value {
        json_schema_value::<Self::Input>()
    }

    fn return_schema(&self) -> Value {
        json_schema_value::<Self::Output>()
    }

    async fn execute(&self, args: Self::Input) -> Result<Self::Output>;
}

/// Object-safe invocation seam stored in the registry.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn metadata(&self) -> &ToolMetadata;
    async fn invoke(&self, args: Value) -> Result<Value>;
}

/// Boxed async invocation closure for dynamically described tools.
pub type InvokeFn =
    Arc<dyn Fn(Value) -> Pin<Box<dyn Future<Output = Result<Value>> + Send>> + Send + Sync>;

struct HostToolWrapper<T: HostTool> {
    tool: T,
    metadata: ToolMetadata,
}

#[async_trait]
impl<T: HostTool> ToolHandler for HostToolWrapper<T> {
    fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    async fn invoke(&self, args: Value) -> Result<Value> {
        let parsed: T::Input = serde_json::from_value(args).map_err(|err| {
            BridgeError::InvalidArgument(format!("Invalid input for {}: {}", self.metadata.name, err))
        })?;
        let output = self.tool.execute(parsed).await?;
        serde_json::to_value(output).map_err(|err| {
            BridgeError::ToolExecution(format!("Invalid output from {}: {}", self.metadata.name, err))
        })
    }
}

struct FnToolHandler {
    metadata: ToolMetadata,
    invoke: InvokeFn,
}

#[async_trait]
impl ToolHandler for FnToolHandler {
    fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    async fn invoke(&self, args: Value) -> Result<Value> {
        (self.invoke)(args).await
    }
}

/// Registry of host tools keyed by `(namespace, name)`
///
/// Registration needs `&mut self`; invocation only needs `&self`, so a built
/// registry can be shared behind an `Arc` by concurrent dispatches.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<ToolName, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool that implements [`HostTool`]
    pub fn register<T: HostTool>(&mut self, tool: T) -> Result<()> {
        let name = ToolName::parse(&T::name())
            .map_err(|err| BridgeError::ToolRegistration(err.to_string()))?;
        let expected = <T::Namespace as NamespaceType>::namespace()?;
        if name.namespace() != &expected {
            return Err(BridgeError::ToolRegistration(format!(
                "Tool '{}' namespace does not match namespace type '{}'",
                name, expected
            )));
        }
        let metadata = ToolMetadata::new(
            name,
            tool.description(),
            tool.parameter_schema(),
            tool.return_schema(),
        );
        self.insert(Arc::new(HostToolWrapper { tool, metadata }))
    }

    /// Register a tool with dynamic metadata and handler.
    pub fn register_dynamic(&mut self, handler: Arc<dyn ToolHandler>) -> Result<()> {
        self.insert(handler)
    }

    /// Register a closure-backed tool.
    pub fn register_fn<F, Fut>(&mut self, metadata: ToolMetadata, invoke: F) -> Result<()>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let invoke: InvokeFn = Arc::new(move |args| Box::pin(invoke(args)));
        self.insert(Arc::new(FnToolHandler { metadata, invoke }))
    }

    fn insert(&mut self, handler: Arc<dyn ToolHandler>) -> Result<()> {
        let metadata = handler.metadata();
        if self.tools.contains_key(&metadata.name) {
            return Err(BridgeError::ToolRegistration(format!(
                "Tool '{}' is already registered",
                metadata.name
            )));
        }
        tracing::info!(
            tool = %metadata.name,
            description = metadata.description.as_str(),
            "Registered tool function"
        );
        self.tools.insert(metadata.name.clone(), handler);
        Ok(())
    }

    pub fn contains(&self, name: &ToolName) -> bool {
        self.tools.contains_key(name)
    }

    pub fn get_metadata(&self, name: &ToolName) -> Option<&ToolMetadata> {
        self.tools.get(name).map(|handler| handler.metadata())
    }

    /// All tool metadata, ordered by name.
    pub fn list_tools(&self) -> Vec<ToolMetadata> {
        let mut tools: Vec<ToolMetadata> = self
            .tools
            .values()
            .map(|handler| handler.metadata().clone())
            .collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    pub fn list_tools_filtered(&self, filters: &FunctionFilters) -> Vec<ToolMetadata> {
        self.list_tools()
            .into_iter()
            .filter(|tool| filters.allows(&tool.name))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Invoke a tool by its string pair. An unknown pair is a typed
    /// [`BridgeError::ToolNotFound`], never a panic.
    pub async fn invoke(&self, namespace: &str, name: &str, args: Value) -> Result<Value> {
        let handler = self.lookup(namespace, name)?;
        tracing::debug!(
            tool = %handler.metadata().name,
            args = ?args,
            "Invoking tool function"
        );
        handler.invoke(args).await
    }

    fn lookup(&self, namespace: &str, name: &str) -> Result<&Arc<dyn ToolHandler>> {
        let not_found = || BridgeError::ToolNotFound(format!("{}.{}", namespace, name));
        let parsed = ToolName::new(namespace, name).map_err(|_| not_found())?;
        self.tools.get(&parsed).ok_or_else(not_found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo_metadata(name: &str) -> ToolMetadata {
        ToolMetadata::new(
            ToolName::parse(name).unwrap(),
            "Echoes its arguments",
            json!({"type": "object", "properties": {"text": {"type": "string"}}}),
            json!({"type": "string"}),
        )
    }

    #[test]
    fn tool_names_parse_and_render() {
        let name = ToolName::parse("light.changeState").unwrap();
        assert_eq!(name.namespace().as_str(), "light");
        assert_eq!(name.local().as_str(), "changeState");
        assert_eq!(name.to_string(), "light.changeState");
        assert_eq!(name.canonical(), "light__changeState");
    }

    #[test]
    fn names_reject_delimiter_and_punctuation() {
        assert!(ToolName::parse("light").is_err());
        assert!(ToolName::parse("li__ght.on").is_err());
        assert!(ToolName::parse("light.turn-on").is_err());
        assert!(ToolName::parse("9light.on").is_err());
        assert!(Namespace::new("").is_err());
    }

    #[test]
    fn metadata_round_trips_through_manifest_shape() {
        let metadata = echo_metadata("text.echo");
        let value = serde_json::to_value(&metadata).unwrap();
        assert_eq!(value["name"], "text.echo");
        assert!(value.get("parameters").is_some());
        let back: ToolMetadata = serde_json::from_value(value).unwrap();
        assert_eq!(back, metadata);
    }

    #[tokio::test]
    async fn closure_tools_are_invoked_by_string_pair() {
        let mut registry = ToolRegistry::new();
        registry
            .register_fn(echo_metadata("text.echo"), |args| async move {
                Ok(args["text"].clone())
            })
            .unwrap();

        let result = registry
            .invoke("text", "echo", json!({"text": "hi"}))
            .await
            .unwrap();
        assert_eq!(result, json!("hi"));
    }

    #[tokio::test]
    async fn unknown_tools_are_typed_errors() {
        let registry = ToolRegistry::new();
        let err = registry.invoke("text", "missing", json!({})).await.unwrap_err();
        assert!(matches!(err, BridgeError::ToolNotFound(name) if name == "text.missing"));

        let err = registry.invoke("bad-ns", "x", json!({})).await.unwrap_err();
        assert!(matches!(err, BridgeError::ToolNotFound(_)));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = ToolRegistry::new();
        registry
            .register_fn(echo_metadata("text.echo"), |args| async move { Ok(args) })
            .unwrap();
        let err = registry
            .register_fn(echo_metadata("text.echo"), |args| async move { Ok(args) })
            .unwrap_err();
        assert!(matches!(err, BridgeError::ToolRegistration(_)));
    }

    #[test]
    fn list_tools_is_sorted() {
        let mut registry = ToolRegistry::new();
        for name in ["zeta.last", "alpha.first", "alpha.second"] {
            registry
                .register_fn(echo_metadata(name), |args| async move { Ok(args) })
                .unwrap();
        }
        let names: Vec<String> = registry
            .list_tools()
            .into_iter()
            .map(|tool| tool.name.to_string())
            .collect();
        assert_eq!(names, vec!["alpha.first", "alpha.second", "zeta.last"]);
    }
}
