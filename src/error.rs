//! Error taxonomy shared by every component of the crate.
//!
//! Each variant corresponds to one of the failure categories a caller needs
//! to distinguish programmatically (dimension mismatches vs. a crashed
//! worker vs. a stale on-disk schema). Ad hoc context at I/O boundaries is
//! layered on with `anyhow::Context` before being folded back into
//! [`Error::Io`].

use std::path::PathBuf;

/// The crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("index {index} is out of bounds for size {size}")]
    OutOfBounds { index: usize, size: usize },

    #[error("unknown id {0}")]
    UnknownId(u64),

    #[error("duplicate id {0}")]
    DuplicateId(u64),

    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("serialization error at {path:?}: {message}")]
    Serialization { path: Option<PathBuf>, message: String },

    #[error("io error at {path:?}: {source}")]
    Io {
        path: Option<PathBuf>,
        #[source]
        source: std::io::Error,
    },

    #[error("worker thread crashed: {0}")]
    ThreadCrashed(String),

    #[error("search cancelled before completion")]
    Cancelled,

    #[error("narrowing conversion of {value} to {target_type} would lose information")]
    Narrowing { value: String, target_type: &'static str },
}

impl Error {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    pub fn serialization(path: Option<PathBuf>, msg: impl Into<String>) -> Self {
        Error::Serialization { path, message: msg.into() }
    }

    pub fn io(path: Option<PathBuf>, source: std::io::Error) -> Self {
        Error::Io { path, source }
    }
}
