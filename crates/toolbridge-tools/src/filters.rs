//! Include/exclude filters selecting which tools get stubs.

use crate::tools::ToolName;
use std::collections::BTreeSet;

/// Namespace and function filters. An unset list does not constrain;
/// exclusion wins over inclusion.
#[derive(Debug, Clone, Default)]
pub struct FunctionFilters {
    included_namespaces: Option<BTreeSet<String>>,
    excluded_namespaces: Option<BTreeSet<String>>,
    included_functions: Option<BTreeSet<ToolName>>,
    excluded_functions: Option<BTreeSet<ToolName>>,
}

impl FunctionFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_included_namespaces<I, S>(mut self, namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.included_namespaces = Some(namespaces.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_excluded_namespaces<I, S>(mut self, namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_namespaces = Some(namespaces.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_included_functions(mut self, functions: impl IntoIterator<Item = ToolName>) -> Self {
        self.included_functions = Some(functions.into_iter().collect());
        self
    }

    pub fn with_excluded_functions(mut self, functions: impl IntoIterator<Item = ToolName>) -> Self {
        self.excluded_functions = Some(functions.into_iter().collect());
        self
    }

    pub fn should_include_namespace(&self, namespace: &str) -> bool {
        if let Some(included) = &self.included_namespaces {
            if !included.contains(namespace) {
                return false;
            }
        }
        if let Some(excluded) = &self.excluded_namespaces {
            if excluded.contains(namespace) {
                return false;
            }
        }
        true
    }

    pub fn should_include_function(&self, name: &ToolName) -> bool {
        if let Some(included) = &self.included_functions {
            if !included.contains(name) {
                return false;
            }
        }
        if let Some(excluded) = &self.excluded_functions {
            if excluded.contains(name) {
                return false;
            }
        }
        true
    }

    pub fn allows(&self, name: &ToolName) -> bool {
        self.should_include_namespace(name.namespace().as_str()) && self.should_include_function(name)
    }
}
