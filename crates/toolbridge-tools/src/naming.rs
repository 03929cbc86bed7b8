//! Name normalization between prompt-facing and sandbox-facing code.
//!
//! Models write tool calls as `light.changeState`, `light-changeState` or
//! `light_changeState`; the sandbox only knows `light__changeState`.

use crate::tools::ToolName;
use regex::{Captures, Regex};
use std::sync::OnceLock;
use toolbridge_core::{BridgeError, Result};

const PYTHON_KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global",
    "if", "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return",
    "try", "while", "with", "yield",
];

/// Rewrite every separator variant of each tool name to its canonical form.
///
/// A match must start the input or follow a character that cannot continue
/// an expression (`obj.light.changeState` is an attribute chain and stays),
/// and must end on an identifier boundary. Already-canonical code is left
/// untouched, so running the rewrite twice is a no-op. Text inside string
/// literals is rewritten as well, which keeps f-string expressions working.
pub fn rewrite_tool_references<'a>(
    code: &str,
    tools: impl IntoIterator<Item = &'a ToolName>,
) -> Result<String> {
    let mut rewritten = code.to_string();
    for tool in tools {
        let pattern = format!(
            r"(^|[^.\w]){}[-._]{}\b",
            regex::escape(tool.namespace().as_str()),
            regex::escape(tool.local().as_str())
        );
        let regex = Regex::new(&pattern)
            .map_err(|err| BridgeError::Codegen(format!("invalid name pattern for {}: {}", tool, err)))?;
        let canonical = tool.canonical();
        rewritten = regex
            .replace_all(&rewritten, |caps: &Captures<'_>| format!("{}{}", &caps[1], canonical))
            .into_owned();
    }
    Ok(rewritten)
}

fn stub_import_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"(?m)^(import functions|from functions).*?(\r?\n|$)")
            .unwrap_or_else(|_| unreachable!("static pattern"))
    })
}

/// Drop `import functions` / `from functions ...` lines copied from the mock module.
pub fn strip_stub_imports(code: &str) -> String {
    stub_import_regex().replace_all(code, "").into_owned()
}

/// Turn an arbitrary property or type name into a legal Python identifier.
pub fn python_identifier(name: &str) -> String {
    let mut ident: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if ident.is_empty() || ident.starts_with(|c: char| c.is_ascii_digit()) {
        ident.insert(0, '_');
    }
    if PYTHON_KEYWORDS.contains(&ident.as_str()) {
        ident.push('_');
    }
    ident
}

pub fn to_pascal_case(name: &str) -> String {
    name.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

/// English singular of a collection name (`lights` -> `light`).
pub fn singularize(word: &str) -> String {
    let lower = word.to_ascii_lowercase();
    if lower.len() > 3 && lower.ends_with("ies") {
        return format!("{}y", &word[..word.len() - 3]);
    }
    if ["sses", "xes", "ches", "shes", "zes"]
        .iter()
        .any(|suffix| lower.ends_with(suffix))
    {
        return word[..word.len() - 2].to_string();
    }
    if ["ss", "us", "is"].iter().any(|suffix| lower.ends_with(suffix)) {
        return word.to_string();
    }
    if lower.len() > 1 && lower.ends_with('s') {
        return word[..word.len() - 1].to_string();
    }
    word.to_string()
}
