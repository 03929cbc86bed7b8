//! Python stub module generation.
//!
//! Mock stubs are read by the planning model: signatures and docstrings only.
//! Execution stubs are uploaded to the sandbox, where each call writes a call
//! record through `modules.channel` and blocks until the host answers.

use crate::naming::python_identifier;
use crate::schema::{Property, ResolvedType, TypeResolver};
use crate::tools::{ToolMetadata, ToolName};
use genco::lang::python;
use genco::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};
use toolbridge_core::{BridgeError, Result};

/// Module the execution stubs import their call plumbing from.
pub const CHANNEL_MODULE: &str = "modules.channel";

const PAYLOAD_LOCAL: &str = "_payload";
const RESERVED_LOCALS: &[&str] = &[PAYLOAD_LOCAL, "call_tool", "decode", "dataclass"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StubMode {
    /// Signatures and docstrings only, for prompts.
    #[default]
    Mock,
    /// Bodies that forward the call to the host.
    Execution,
}

impl std::fmt::Display for StubMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StubMode::Mock => f.write_str("mock"),
            StubMode::Execution => f.write_str("execution"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedTool {
    pub name: ToolName,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct GeneratedModule {
    pub source: String,
    /// Tools that received a stub, in emission order.
    pub functions: Vec<ToolName>,
    /// Tools left out because their schemas could not be resolved.
    pub skipped: Vec<SkippedTool>,
    /// Record classes the module defines, in emission order.
    pub records: Vec<String>,
}

struct Parameter {
    ident: String,
    key: String,
    annotation: String,
    required: bool,
    description: Option<String>,
}

struct PlannedFunction<'a> {
    metadata: &'a ToolMetadata,
    parameters: Vec<Parameter>,
    returns: String,
}

/// Render one Python module holding a stub for each tool.
///
/// Output depends only on the tool list: tools are emitted in name order and
/// record types in first-use order.
pub fn render_tool_module(tools: &[ToolMetadata], mode: StubMode) -> Result<GeneratedModule> {
    render_with(TypeResolver::new(), tools, mode)
}

/// Like [`render_tool_module`], for a module imported next to earlier ones.
///
/// Record classes never reuse a name in `reserved`, so star-importing this
/// module cannot rebind a class an earlier module defined.
pub fn render_delta_module(
    tools: &[ToolMetadata],
    mode: StubMode,
    reserved: &BTreeSet<String>,
) -> Result<GeneratedModule> {
    render_with(TypeResolver::with_reserved_names(reserved.iter().cloned()), tools, mode)
}

fn render_with(mut resolver: TypeResolver, tools: &[ToolMetadata], mode: StubMode) -> Result<GeneratedModule> {
    let mut ordered: Vec<&ToolMetadata> = tools.iter().collect();
    ordered.sort_by(|a, b| a.name.cmp(&b.name));

    let mut planned = Vec::new();
    let mut skipped = Vec::new();
    for metadata in ordered {
        let checkpoint = resolver.checkpoint();
        match plan_function(&mut resolver, metadata) {
            Ok(function) => planned.push(function),
            Err(err) => {
                resolver.rollback(checkpoint);
                tracing::warn!(tool = %metadata.name, error = %err, "Skipping tool with unusable schema");
                skipped.push(SkippedTool {
                    name: metadata.name.clone(),
                    reason: err.to_string(),
                });
            }
        }
    }

    let mut tokens = python::Tokens::new();
    line(&mut tokens, "# Host tool stubs for the sandbox");
    line(&mut tokens, "# This file is auto-generated - do not edit manually");
    line(&mut tokens, format!("# mode: {}", mode));
    tokens.line();
    line(&mut tokens, "from __future__ import annotations");
    tokens.line();
    line(&mut tokens, "from dataclasses import dataclass");
    line(&mut tokens, "from typing import Any, List, Optional");
    if mode == StubMode::Execution {
        tokens.line();
        line(&mut tokens, format!("from {} import call_tool, decode", CHANNEL_MODULE));
    }

    for named in resolver.types() {
        tokens.line();
        render_record(&mut tokens, &resolver, &named.name, named.description.as_deref(), &named.properties);
    }

    for function in &planned {
        tokens.line();
        render_function(&mut tokens, function, mode);
    }

    let source = tokens
        .to_file_string()
        .map_err(|e| BridgeError::Codegen(format!("Python render error: {}", e)))?;
    Ok(GeneratedModule {
        source,
        functions: planned.iter().map(|f| f.metadata.name.clone()).collect(),
        skipped,
        records: resolver.types().iter().map(|named| named.name.clone()).collect(),
    })
}

fn plan_function<'a>(resolver: &mut TypeResolver, metadata: &'a ToolMetadata) -> Result<PlannedFunction<'a>> {
    let namespace = metadata.name.namespace().as_str();
    let local = metadata.name.local().as_str();

    let properties = resolver.resolve_parameters(&metadata.parameter_schema, namespace, local)?;
    let returns = if metadata.return_schema.is_null() {
        ResolvedType::Any
    } else {
        resolver.resolve(&metadata.return_schema, namespace, &format!("{}_return", local))?
    };

    let mut taken: HashSet<String> = RESERVED_LOCALS.iter().map(|s| s.to_string()).collect();
    let mut parameters: Vec<Parameter> = properties
        .iter()
        .map(|property| Parameter {
            ident: unique_ident(&mut taken, &property.name),
            key: property.name.clone(),
            annotation: resolver.python_type(&property.ty),
            required: property.required,
            description: property.description.clone(),
        })
        .collect();
    // Python rejects a defaulted parameter before a required one.
    parameters.sort_by_key(|parameter| !parameter.required);

    Ok(PlannedFunction {
        metadata,
        parameters,
        returns: resolver.python_type(&returns),
    })
}

fn unique_ident(taken: &mut HashSet<String>, key: &str) -> String {
    let mut ident = python_identifier(key);
    while taken.contains(&ident) {
        ident.push('_');
    }
    taken.insert(ident.clone());
    ident
}

fn render_record(
    tokens: &mut python::Tokens,
    resolver: &TypeResolver,
    name: &str,
    description: Option<&str>,
    properties: &[Property],
) {
    line(tokens, "@dataclass");
    line(tokens, format!("class {}:", name));
    tokens.indent();
    if let Some(description) = description {
        line(tokens, format!("\"\"\"{}\"\"\"", docstring_text(description)));
    }

    let mut taken = HashSet::new();
    let mut fields: Vec<(String, &Property)> = properties
        .iter()
        .map(|property| (unique_ident(&mut taken, &property.name), property))
        .collect();
    fields.sort_by_key(|(_, property)| !property.required);

    for (ident, property) in &fields {
        let annotation = resolver.python_type(&property.ty);
        let declaration = if property.required {
            format!("{}: {}", ident, annotation)
        } else {
            format!("{}: Optional[{}] = None", ident, annotation)
        };
        let mut notes = Vec::new();
        if let Some(format) = &property.format {
            notes.push(format!("format: {}", format));
        }
        if !property.allowed_values.is_empty() {
            notes.push(format!("one of: {}", property.allowed_values.join(", ")));
        }
        if notes.is_empty() {
            line(tokens, declaration);
        } else {
            line(tokens, format!("{}  # {}", declaration, notes.join("; ")));
        }
    }

    let renamed: Vec<String> = fields
        .iter()
        .filter(|(ident, property)| *ident != property.name)
        .map(|(ident, property)| format!("{}: {}", py_string(ident), py_string(&property.name)))
        .collect();
    if !renamed.is_empty() {
        line(tokens, format!("__json_keys__ = {{{}}}", renamed.join(", ")));
    }
    tokens.unindent();
}

fn render_function(tokens: &mut python::Tokens, function: &PlannedFunction<'_>, mode: StubMode) {
    let name = &function.metadata.name;
    let signature: Vec<String> = function
        .parameters
        .iter()
        .map(|parameter| {
            if parameter.required {
                format!("{}: {}", parameter.ident, parameter.annotation)
            } else {
                format!("{}: Optional[{}] = None", parameter.ident, parameter.annotation)
            }
        })
        .collect();
    line(
        tokens,
        format!("def {}({}) -> {}:", name.canonical(), signature.join(", "), function.returns),
    );
    tokens.indent();

    line(tokens, "\"\"\"");
    let description = docstring_text(&function.metadata.description);
    if !description.is_empty() {
        line(tokens, description);
    }
    if !function.parameters.is_empty() {
        line(tokens, "Args:");
        tokens.indent();
        for parameter in &function.parameters {
            match &parameter.description {
                Some(text) => line(tokens, format!("{}: {}", parameter.ident, docstring_text(text))),
                None => line(tokens, parameter.ident.as_str()),
            }
        }
        tokens.unindent();
    }
    line(tokens, format!("Returns: {}", function.returns));
    line(tokens, "\"\"\"");

    match mode {
        StubMode::Mock => line(tokens, "..."),
        StubMode::Execution => {
            let required: Vec<String> = function
                .parameters
                .iter()
                .filter(|parameter| parameter.required)
                .map(|parameter| format!("{}: {}", py_string(&parameter.key), parameter.ident))
                .collect();
            line(tokens, format!("{} = {{{}}}", PAYLOAD_LOCAL, required.join(", ")));
            for parameter in function.parameters.iter().filter(|p| !p.required) {
                line(tokens, format!("if {} is not None:", parameter.ident));
                tokens.indent();
                line(
                    tokens,
                    format!("{}[{}] = {}", PAYLOAD_LOCAL, py_string(&parameter.key), parameter.ident),
                );
                tokens.unindent();
            }
            line(
                tokens,
                format!(
                    "return decode({}, call_tool({}, {}, {}))",
                    function.returns,
                    py_string(name.namespace().as_str()),
                    py_string(name.local().as_str()),
                    PAYLOAD_LOCAL
                ),
            );
        }
    }
    tokens.unindent();
}

fn line(tokens: &mut python::Tokens, text: impl AsRef<str>) {
    let text = text.as_ref();
    quote_in!(*tokens => $(text));
    tokens.push();
}

/// Python string literal. JSON string escapes are a subset of Python's.
fn py_string(text: &str) -> String {
    Value::String(text.to_string()).to_string()
}

/// Single-line docstring body with quotes and backslashes escaped.
fn docstring_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn change_state() -> ToolMetadata {
        ToolMetadata::new(
            ToolName::parse("light.changeState").unwrap(),
            "Turns a light on or off",
            json!({
                "type": "object",
                "properties": {
                    "id": {"type": "string", "description": "Light id"},
                    "isOn": {"type": "boolean"},
                    "brightness": {"type": "integer", "format": "int32"}
                },
                "required": ["id", "isOn"]
            }),
            json!({"type": "object", "properties": {"ok": {"type": "boolean"}}, "required": ["ok"]}),
        )
    }

    #[test]
    fn mock_stub_has_signature_and_no_body() {
        let module = render_tool_module(&[change_state()], StubMode::Mock).unwrap();
        let source = &module.source;
        assert!(source.contains(
            "def light__changeState(id: str, isOn: bool, brightness: Optional[int] = None) -> Light__changeState_return:"
        ));
        assert!(source.contains("        ...\n") || source.contains("    ...\n"));
        assert!(!source.contains("call_tool"));
        assert!(source.contains("class Light__changeState_return:"));
        assert!(source.contains("ok: bool"));
    }

    #[test]
    fn execution_stub_forwards_call() {
        let module = render_tool_module(&[change_state()], StubMode::Execution).unwrap();
        let source = &module.source;
        assert!(source.contains("from modules.channel import call_tool, decode"));
        assert!(source.contains("_payload = {\"id\": id, \"isOn\": isOn}"));
        assert!(source.contains("if brightness is not None:"));
        assert!(source.contains("_payload[\"brightness\"] = brightness"));
        assert!(source.contains(
            "return decode(Light__changeState_return, call_tool(\"light\", \"changeState\", _payload))"
        ));
    }

    #[test]
    fn future_import_comes_first() {
        let module = render_tool_module(&[change_state()], StubMode::Execution).unwrap();
        let first_code_line = module
            .source
            .lines()
            .find(|line| !line.trim().is_empty() && !line.starts_with('#'))
            .unwrap();
        assert_eq!(first_code_line, "from __future__ import annotations");
    }

    #[test]
    fn unusable_schemas_are_skipped() {
        let broken = ToolMetadata::new(
            ToolName::parse("light.broken").unwrap(),
            "",
            json!({"type": "object", "properties": {"x": {"$ref": "#/$defs/Missing"}}}),
            Value::Null,
        );
        let module = render_tool_module(&[broken, change_state()], StubMode::Mock).unwrap();
        assert_eq!(module.functions, vec![ToolName::parse("light.changeState").unwrap()]);
        assert_eq!(module.skipped.len(), 1);
        assert_eq!(module.skipped[0].name.to_string(), "light.broken");
        assert!(!module.source.contains("light__broken"));
    }

    #[test]
    fn awkward_keys_are_renamed_and_mapped() {
        let tool = ToolMetadata::new(
            ToolName::parse("scene.create").unwrap(),
            "Creates a \"scene\"",
            json!({"type": "object", "properties": {"class": {"type": "string"}}, "required": ["class"]}),
            json!({
                "type": "object",
                "properties": {"scene-id": {"type": "string"}},
                "required": ["scene-id"]
            }),
        );
        let module = render_tool_module(&[tool], StubMode::Execution).unwrap();
        let source = &module.source;
        assert!(source.contains("def scene__create(class_: str) -> Scene__create_return:"));
        assert!(source.contains("_payload = {\"class\": class_}"));
        assert!(source.contains("scene_id: str"));
        assert!(source.contains("__json_keys__ = {\"scene_id\": \"scene-id\"}"));
        assert!(source.contains("Creates a \\\"scene\\\""));
    }

    #[test]
    fn required_parameters_lead_in_declaration_order() {
        let tool = ToolMetadata::new(
            ToolName::parse("light.setColor").unwrap(),
            "",
            json!({
                "type": "object",
                "properties": {
                    "zone": {"type": "string"},
                    "name": {"type": "string"},
                    "brightness": {"type": "integer"},
                    "alpha": {"type": "number"}
                },
                "required": ["name", "brightness"]
            }),
            Value::Null,
        );
        let module = render_tool_module(&[tool], StubMode::Mock).unwrap();
        assert!(module.source.contains(
            "def light__setColor(name: str, brightness: int, zone: Optional[str] = None, alpha: Optional[float] = None) -> Any:"
        ));
    }

    #[test]
    fn delta_modules_avoid_reserved_record_names() {
        let first = render_tool_module(&[change_state()], StubMode::Execution).unwrap();
        assert_eq!(first.records, vec!["Light__changeState_return".to_string()]);

        let reserved: BTreeSet<String> = first.records.iter().cloned().collect();
        let renamed = ToolMetadata::new(
            ToolName::parse("light.changeState").unwrap(),
            "",
            Value::Null,
            json!({"type": "object", "properties": {"ok": {"type": "string"}}}),
        );
        let delta = render_delta_module(&[renamed], StubMode::Execution, &reserved).unwrap();
        assert_eq!(delta.records, vec!["Light__changeState_return_2".to_string()]);
        assert!(delta.source.contains("class Light__changeState_return_2:"));
        assert!(!delta.source.contains("class Light__changeState_return:"));
        assert!(delta.source.contains("return decode(Light__changeState_return_2, "));
    }
}
