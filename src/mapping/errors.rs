use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building or loading a path mapping table.
///
/// Every variant means the table itself is unusable, so none of them is recoverable per file.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("candidate '{new}' has an empty old path")]
    EmptyPattern { new: String },

    #[error("candidate '{old}' -> '{new}' changes the byte length ({old_len} != {new_len})")]
    LengthMismatch {
        old: String,
        new: String,
        old_len: usize,
        new_len: usize,
    },

    #[error("old path '{0}' appears in more than one candidate")]
    DuplicateCandidate(String),

    #[error("old path '{outer}' embeds old path '{inner}' but their rewrites disagree")]
    OverlappingCandidates { outer: String, inner: String },

    #[error("new path '{candidate}' can form old path '{old}', a second run would rewrite it again")]
    ChainedCandidate { candidate: String, old: String },

    #[error("failed to read configuration {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = core::result::Result<T, ConfigurationError>;
