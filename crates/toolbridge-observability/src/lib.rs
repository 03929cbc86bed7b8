//! Observability helpers (spans, scope attributes, tracing setup).

pub mod scope;
pub mod spans;
pub mod tracing_setup;

pub use scope::*;
pub use spans::*;
pub use tracing_setup::*;
