pub mod test_tools;

pub use test_tools::*;
