//! Length-preserving rewriting of absolute paths embedded in shared libraries.
//!
//! A relocatable bundle (an AppImage `AppDir`) ships helper binaries that the bundled libraries
//! look up through paths compiled in by the distribution that built them. `relocpatch` overwrites
//! those paths with paths of exactly the same byte length, pointing at a staging directory the
//! bundle launcher fills with symlinks. The binaries are treated as raw bytes: nothing is parsed,
//! nothing moves, and the file length never changes.

pub mod batch;
pub mod config;
pub mod mapping;
pub mod rewriter;
