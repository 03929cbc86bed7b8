//! Host tool registry and sandbox stub generation.

pub mod filters;
pub mod namespaces;
pub mod naming;
pub mod py_gen;
pub mod schema;
pub mod tool_schema;
pub mod tools;

pub use filters::FunctionFilters;
pub use naming::{rewrite_tool_references, strip_stub_imports};
pub use py_gen::{render_delta_module, render_tool_module, GeneratedModule, SkippedTool, StubMode};
pub use schema::{NamedType, PrimitiveKind, Property, ResolvedType, TypeResolver};
pub use tool_schema::json_schema_value;
pub use tools::{
    HostTool, InvokeFn, LocalToolName, Namespace, ToolHandler, ToolMetadata, ToolName, ToolRegistry,
    NAME_DELIMITER,
};
