mod errors;
pub mod mapping;

pub use errors::*;
