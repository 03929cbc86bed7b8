//! JSON Schema to sandbox type resolution.
//!
//! Every object schema reachable from a tool's parameters or result becomes a
//! named record type. Structurally identical schemas share one name, so two
//! tools returning the same shape end up with a single generated class.

use crate::naming::{python_identifier, singularize, to_pascal_case};
use crate::tools::NAME_DELIMITER;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use toolbridge_core::{BridgeError, Result};

const MAX_SCHEMA_DEPTH: usize = 64;

/// Keywords that do not change the shape of a value. They are dropped before
/// comparing schemas so that `title` differences do not split types.
const ANNOTATION_KEYWORDS: &[&str] = &["$schema", "$id", "$comment", "title", "$defs", "definitions"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    String,
    Number,
    Integer,
    Boolean,
}

impl PrimitiveKind {
    fn from_type_name(name: &str) -> Option<Self> {
        match name {
            "string" => Some(Self::String),
            "number" => Some(Self::Number),
            "integer" => Some(Self::Integer),
            "boolean" => Some(Self::Boolean),
            _ => None,
        }
    }

    pub fn python_name(self) -> &'static str {
        match self {
            Self::String => "str",
            Self::Number => "float",
            Self::Integer => "int",
            Self::Boolean => "bool",
        }
    }
}

/// Index of a [`NamedType`] inside its resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeRef(usize);

impl TypeRef {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResolvedType {
    Primitive(PrimitiveKind),
    List(Box<ResolvedType>),
    Object(TypeRef),
    /// Unconstrained or not representable; passed through as plain JSON.
    Any,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    /// Key as it appears in the JSON payload.
    pub name: String,
    pub ty: ResolvedType,
    pub required: bool,
    pub description: Option<String>,
    pub format: Option<String>,
    /// String `enum` values, if the schema restricts them.
    pub allowed_values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NamedType {
    pub name: String,
    /// Namespace that first produced this shape.
    pub namespace: String,
    pub description: Option<String>,
    /// Properties in schema order.
    pub properties: Vec<Property>,
}

/// Position to roll back to when one tool's schema turns out to be unusable.
#[derive(Debug, Clone, Copy)]
pub struct Checkpoint(usize);

struct PendingObject {
    target: TypeRef,
    schema: Value,
    namespace: String,
}

/// Resolves schemas into [`ResolvedType`]s, collecting named record types.
///
/// Objects are expanded breadth-first through a work queue, so deep nesting
/// never grows the Rust call stack.
#[derive(Default)]
pub struct TypeResolver {
    types: Vec<NamedType>,
    memo: HashMap<String, TypeRef>,
    names: HashSet<String>,
    /// Names owned by another module that new types must not reuse
    reserved: HashSet<String>,
    queue: VecDeque<PendingObject>,
}

enum Shape<'a> {
    Primitive(PrimitiveKind),
    Array(Option<&'a Value>),
    Object,
    Any,
}

impl TypeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolver whose new types never take one of `names`.
    pub fn with_reserved_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            reserved: names.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Resolve `schema`, naming any new object type after `proposed_name`
    /// within `namespace`.
    pub fn resolve(&mut self, schema: &Value, namespace: &str, proposed_name: &str) -> Result<ResolvedType> {
        let context = format!("{}.{}", namespace, proposed_name);
        let inlined = inline_refs(schema).map_err(|msg| BridgeError::schema(&context, msg))?;
        let resolved = self
            .resolve_shallow(&inlined, namespace, proposed_name)
            .and_then(|resolved| self.drain().map(|()| resolved));
        if resolved.is_err() {
            self.queue.clear();
        }
        resolved.map_err(|msg| BridgeError::schema(&context, msg))
    }

    /// Resolve a tool's argument object into its flattened parameter list.
    ///
    /// The argument object itself is not named; nested objects are. A missing
    /// or property-less schema means the tool takes no arguments.
    pub fn resolve_parameters(&mut self, schema: &Value, namespace: &str, function: &str) -> Result<Vec<Property>> {
        if schema.is_null() {
            return Ok(Vec::new());
        }
        let context = format!("{}.{}", namespace, function);
        let resolved = inline_refs(schema).and_then(|inlined| {
            let (shape, effective) = classify(&inlined)?;
            let properties = match (shape, effective.as_object()) {
                (Shape::Object, Some(object)) => self.resolve_properties(object, namespace)?,
                (Shape::Any, _) => Vec::new(),
                _ => return Err("parameters must describe an object".to_string()),
            };
            self.drain()?;
            Ok(properties)
        });
        if resolved.is_err() {
            self.queue.clear();
        }
        resolved.map_err(|msg| BridgeError::schema(&context, msg))
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint(self.types.len())
    }

    /// Forget every type created since `checkpoint`.
    pub fn rollback(&mut self, checkpoint: Checkpoint) {
        let keep = checkpoint.0;
        self.types.truncate(keep);
        self.memo.retain(|_, type_ref| type_ref.0 < keep);
        self.names = self.types.iter().map(|ty| ty.name.clone()).collect();
        self.queue.clear();
    }

    pub fn types(&self) -> &[NamedType] {
        &self.types
    }

    pub fn get(&self, type_ref: TypeRef) -> Option<&NamedType> {
        self.types.get(type_ref.0)
    }

    /// Python annotation for a resolved type.
    pub fn python_type(&self, ty: &ResolvedType) -> String {
        match ty {
            ResolvedType::Primitive(kind) => kind.python_name().to_string(),
            ResolvedType::List(inner) => format!("List[{}]", self.python_type(inner)),
            ResolvedType::Object(type_ref) => self
                .get(*type_ref)
                .map(|ty| ty.name.clone())
                .unwrap_or_else(|| "Any".to_string()),
            ResolvedType::Any => "Any".to_string(),
        }
    }

    fn resolve_shallow(
        &mut self,
        schema: &Value,
        namespace: &str,
        proposed_name: &str,
    ) -> std::result::Result<ResolvedType, String> {
        let mut list_depth = 0usize;
        let mut current = schema;
        let mut name = proposed_name.to_string();
        let base = loop {
            let (shape, effective) = classify(current)?;
            match shape {
                Shape::Array(items) => {
                    list_depth += 1;
                    if list_depth > MAX_SCHEMA_DEPTH {
                        return Err(depth_error());
                    }
                    name = singularize(&name);
                    match items {
                        Some(items) => current = items,
                        None => break ResolvedType::Any,
                    }
                }
                Shape::Primitive(kind) => break ResolvedType::Primitive(kind),
                Shape::Object => break ResolvedType::Object(self.intern_object(effective, namespace, &name)),
                Shape::Any => break ResolvedType::Any,
            }
        };
        Ok((0..list_depth).fold(base, |inner, _| ResolvedType::List(Box::new(inner))))
    }

    fn intern_object(&mut self, schema: &Value, namespace: &str, proposed_name: &str) -> TypeRef {
        let canonical = canonical_key(schema);
        if let Some(existing) = self.memo.get(&canonical) {
            return *existing;
        }
        let name = self.unique_name(namespace, proposed_name);
        let target = TypeRef(self.types.len());
        self.types.push(NamedType {
            name: name.clone(),
            namespace: namespace.to_string(),
            description: schema
                .get("description")
                .and_then(Value::as_str)
                .map(str::to_string),
            properties: Vec::new(),
        });
        self.names.insert(name);
        self.memo.insert(canonical, target);
        self.queue.push_back(PendingObject {
            target,
            schema: schema.clone(),
            namespace: namespace.to_string(),
        });
        target
    }

    fn unique_name(&self, namespace: &str, proposed_name: &str) -> String {
        let base = format!(
            "{}{}{}",
            to_pascal_case(namespace),
            NAME_DELIMITER,
            python_identifier(proposed_name)
        );
        let taken = |candidate: &String| self.names.contains(candidate) || self.reserved.contains(candidate);
        if !taken(&base) {
            return base;
        }
        (2..)
            .map(|suffix| format!("{}_{}", base, suffix))
            .find(|candidate| !taken(candidate))
            .unwrap_or(base)
    }

    fn drain(&mut self) -> std::result::Result<(), String> {
        while let Some(pending) = self.queue.pop_front() {
            let Some(object) = pending.schema.as_object() else {
                return Err("object schema expected".to_string());
            };
            let properties = self.resolve_properties(object, &pending.namespace)?;
            if let Some(named) = self.types.get_mut(pending.target.0) {
                named.properties = properties;
            }
        }
        Ok(())
    }

    fn resolve_properties(
        &mut self,
        object: &Map<String, Value>,
        namespace: &str,
    ) -> std::result::Result<Vec<Property>, String> {
        let required = required_names(object)?;
        let mut properties = Vec::new();
        if let Some(Value::Object(declared)) = object.get("properties") {
            for (name, property_schema) in declared {
                let ty = self.resolve_shallow(property_schema, namespace, name)?;
                properties.push(Property {
                    name: name.clone(),
                    ty,
                    required: required.contains(name.as_str())
                        || property_schema.get("required") == Some(&Value::Bool(true)),
                    description: string_keyword(property_schema, "description"),
                    format: string_keyword(property_schema, "format"),
                    allowed_values: allowed_values(property_schema),
                });
            }
        }
        Ok(properties)
    }
}

/// Key-order independent rendering used to detect structurally equal schemas.
///
/// `description` keywords do not take part in the comparison; property
/// names and literal values (`enum`, `default`, ...) always do.
fn canonical_key(schema: &Value) -> String {
    match schema {
        Value::Object(object) => canonical_object(object, |key, child| {
            if key == "description" {
                None
            } else {
                Some(canonical_keyword(key, child))
            }
        }),
        Value::Array(items) => canonical_array(items, canonical_key),
        other => other.to_string(),
    }
}

fn canonical_keyword(key: &str, child: &Value) -> String {
    match (key, child) {
        ("properties" | "patternProperties", Value::Object(members)) => {
            canonical_object(members, |_, member| Some(canonical_key(member)))
        }
        ("items" | "additionalProperties" | "not", _) => canonical_key(child),
        ("anyOf" | "oneOf" | "allOf", Value::Array(branches)) => canonical_array(branches, canonical_key),
        _ => canonical_literal(child),
    }
}

fn canonical_literal(value: &Value) -> String {
    match value {
        Value::Object(object) => canonical_object(object, |_, child| Some(canonical_literal(child))),
        Value::Array(items) => canonical_array(items, canonical_literal),
        other => other.to_string(),
    }
}

fn canonical_object<F>(object: &Map<String, Value>, mut render: F) -> String
where
    F: FnMut(&str, &Value) -> Option<String>,
{
    let mut entries: Vec<(&String, &Value)> = object.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    let body: Vec<String> = entries
        .into_iter()
        .filter_map(|(key, child)| {
            render(key, child).map(|rendered| format!("{}:{}", Value::String(key.clone()), rendered))
        })
        .collect();
    format!("{{{}}}", body.join(","))
}

fn canonical_array(items: &[Value], render: fn(&Value) -> String) -> String {
    let body: Vec<String> = items.iter().map(render).collect();
    format!("[{}]", body.join(","))
}

fn depth_error() -> String {
    format!("schema nesting exceeds {} levels", MAX_SCHEMA_DEPTH)
}

fn string_keyword(schema: &Value, keyword: &str) -> Option<String> {
    schema.get(keyword).and_then(Value::as_str).map(str::to_string)
}

fn allowed_values(schema: &Value) -> Vec<String> {
    schema
        .get("enum")
        .and_then(Value::as_array)
        .map(|values| values.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default()
}

fn required_names(object: &Map<String, Value>) -> std::result::Result<HashSet<&str>, String> {
    match object.get("required") {
        None | Some(Value::Bool(_)) => Ok(HashSet::new()),
        Some(Value::Array(names)) => names
            .iter()
            .map(|name| {
                name.as_str()
                    .ok_or_else(|| "'required' must list property names".to_string())
            })
            .collect(),
        Some(_) => Err("'required' must list property names".to_string()),
    }
}

fn is_null_schema(schema: &Value) -> bool {
    schema.get("type").and_then(Value::as_str) == Some("null")
}

/// Peel `anyOf`/`oneOf` wrappers and decide what a schema describes.
fn classify(schema: &Value) -> std::result::Result<(Shape<'_>, &Value), String> {
    let mut current = schema;
    for _ in 0..MAX_SCHEMA_DEPTH {
        let object = match current {
            Value::Object(object) => object,
            Value::Bool(_) => return Ok((Shape::Any, current)),
            _ => return Err("schema must be an object".to_string()),
        };

        if let Some(branches) = object.get("anyOf").or_else(|| object.get("oneOf")) {
            let branches = branches
                .as_array()
                .ok_or("'anyOf'/'oneOf' must be a list of schemas")?;
            let concrete: Vec<&Value> = branches.iter().filter(|branch| !is_null_schema(branch)).collect();
            if concrete.len() == 1 && object.get("type").is_none() {
                current = concrete[0];
                continue;
            }
            return Ok((Shape::Any, current));
        }

        let type_name = match object.get("type") {
            None => return Ok((Shape::Any, current)),
            Some(Value::String(name)) => name.as_str(),
            Some(Value::Array(names)) => names
                .iter()
                .filter_map(Value::as_str)
                .find(|name| *name != "null")
                .unwrap_or("null"),
            Some(_) => return Err("'type' must be a string or a list of strings".to_string()),
        };

        let shape = match type_name {
            "array" => match object.get("items") {
                None => Shape::Array(None),
                Some(items @ (Value::Object(_) | Value::Bool(_))) => Shape::Array(Some(items)),
                Some(_) => return Err("'items' must be a schema object".to_string()),
            },
            "object" => match object.get("properties") {
                None => Shape::Any,
                Some(Value::Object(properties)) if properties.is_empty() => Shape::Any,
                Some(Value::Object(_)) => Shape::Object,
                Some(_) => return Err("'properties' must be an object".to_string()),
            },
            other => PrimitiveKind::from_type_name(other)
                .map(Shape::Primitive)
                .unwrap_or(Shape::Any),
        };
        return Ok((shape, current));
    }
    Err(depth_error())
}

/// Inline local `$ref`s and strip annotation keywords.
///
/// Only `#/$defs/...` and `#/definitions/...` references are supported; a
/// definition that refers back to itself is rejected.
fn inline_refs(schema: &Value) -> std::result::Result<Value, String> {
    let mut defs = Map::new();
    for key in ["definitions", "$defs"] {
        match schema.get(key) {
            None => {}
            Some(Value::Object(found)) => defs.extend(found.iter().map(|(k, v)| (k.clone(), v.clone()))),
            Some(_) => return Err(format!("'{}' must be an object", key)),
        }
    }
    let mut expanding = Vec::new();
    inline_schema(schema, &defs, &mut expanding, 0)
}

fn inline_schema(
    value: &Value,
    defs: &Map<String, Value>,
    expanding: &mut Vec<String>,
    depth: usize,
) -> std::result::Result<Value, String> {
    if depth > MAX_SCHEMA_DEPTH {
        return Err(depth_error());
    }
    let Some(object) = value.as_object() else {
        return Ok(value.clone());
    };

    if let Some(reference) = object.get("$ref") {
        let reference = reference.as_str().ok_or("'$ref' must be a string")?;
        let def_name = local_definition(reference)
            .ok_or_else(|| format!("unsupported reference '{}'", reference))?;
        if expanding.contains(&def_name) {
            return Err(format!("self-referential schema through '{}'", reference));
        }
        let target = defs
            .get(&def_name)
            .ok_or_else(|| format!("unresolvable reference '{}'", reference))?;
        expanding.push(def_name);
        let mut resolved = inline_schema(target, defs, expanding, depth + 1)?;
        expanding.pop();
        if let Value::Object(resolved_object) = &mut resolved {
            for (key, sibling) in object {
                if key == "$ref" || ANNOTATION_KEYWORDS.contains(&key.as_str()) {
                    continue;
                }
                let sibling = inline_keyword(key, sibling, defs, expanding, depth)?;
                resolved_object.insert(key.clone(), sibling);
            }
        }
        return Ok(resolved);
    }

    let mut out = Map::new();
    for (key, child) in object {
        if ANNOTATION_KEYWORDS.contains(&key.as_str()) {
            continue;
        }
        out.insert(key.clone(), inline_keyword(key, child, defs, expanding, depth)?);
    }
    Ok(Value::Object(out))
}

fn inline_keyword(
    key: &str,
    child: &Value,
    defs: &Map<String, Value>,
    expanding: &mut Vec<String>,
    depth: usize,
) -> std::result::Result<Value, String> {
    match key {
        "properties" | "patternProperties" => {
            let Value::Object(members) = child else {
                return Err(format!("'{}' must be an object", key));
            };
            let mut out = Map::new();
            for (name, schema) in members {
                out.insert(name.clone(), inline_schema(schema, defs, expanding, depth + 1)?);
            }
            Ok(Value::Object(out))
        }
        "items" | "additionalProperties" | "not" => inline_schema(child, defs, expanding, depth + 1),
        "anyOf" | "oneOf" | "allOf" => {
            let Value::Array(branches) = child else {
                return Err(format!("'{}' must be a list of schemas", key));
            };
            branches
                .iter()
                .map(|branch| inline_schema(branch, defs, expanding, depth + 1))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(Value::Array)
        }
        _ => Ok(child.clone()),
    }
}

fn local_definition(reference: &str) -> Option<String> {
    let name = reference
        .strip_prefix("#/$defs/")
        .or_else(|| reference.strip_prefix("#/definitions/"))?;
    if name.is_empty() || name.contains('/') {
        return None;
    }
    Some(name.replace("~1", "/").replace("~0", "~"))
}
