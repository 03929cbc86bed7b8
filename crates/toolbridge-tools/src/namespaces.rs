//! Tool namespace type system
//!
//! Namespaces are represented as Rust types so a typed tool cannot be
//! registered under the wrong namespace string.

use crate::tools::Namespace;
use toolbridge_core::Result;

/// Trait for tool namespace types
///
/// # Example
/// ```rust,no_run
/// use toolbridge_tools::namespaces::NamespaceType;
///
/// pub struct Light;
///
/// impl NamespaceType for Light {
///     const NAME: &'static str = "light";
///     fn description() -> &'static str {
///         "Smart lighting"
///     }
/// }
/// ```
pub trait NamespaceType: Send + Sync + 'static {
    /// The namespace name as seen by the sandbox (e.g., "light")
    const NAME: &'static str;

    /// Description of what this namespace provides
    fn description() -> &'static str;

    fn namespace() -> Result<Namespace> {
        Namespace::new(Self::NAME)
    }
}
