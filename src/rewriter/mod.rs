mod errors;
pub mod rewriter;

pub use errors::*;
