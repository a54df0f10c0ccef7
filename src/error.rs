//! Error types for dumpload
//!
//! Provides a unified error type for planning, encoding, delivery and
//! post-import verification.

use thiserror::Error;

/// Result type alias using LoadError
pub type Result<T> = std::result::Result<T, LoadError>;

/// Unified error type for dumpload operations
#[derive(Debug, Error)]
pub enum LoadError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Planning Errors
    // -------------------------------------------------------------------------
    #[error("unknown columns in header [{}]", .0.join(" "))]
    UnknownColumns(Vec<String>),

    #[error("planning failed: {0}")]
    Planning(String),

    // -------------------------------------------------------------------------
    // Parsing / Encoding Errors
    // -------------------------------------------------------------------------
    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("column count mismatch, expected {expected}, got {got}")]
    ColumnCountMismatch { expected: usize, got: usize },

    #[error("encode error: {0}")]
    Encode(String),

    /// Wraps another error with the chunk key (`path:offset`) and the
    /// parser position at which it happened.
    #[error("in file {key} at offset {offset}: {source}")]
    InFile {
        key: String,
        offset: u64,
        #[source]
        source: Box<LoadError>,
    },

    // -------------------------------------------------------------------------
    // Delivery / Backend Errors
    // -------------------------------------------------------------------------
    #[error("backend error: {0}")]
    Backend(String),

    #[error("delivery error: {0}")]
    Delivery(String),

    #[error("operation canceled")]
    Canceled,

    // -------------------------------------------------------------------------
    // Verification Errors
    // -------------------------------------------------------------------------
    #[error("checksum mismatched remote vs local => {0}")]
    ChecksumMismatch(String),

    // -------------------------------------------------------------------------
    // Checkpoint / Serialization Errors
    // -------------------------------------------------------------------------
    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0} table(s) failed to be imported")]
    TablesFailed(usize),
}

impl LoadError {
    /// Attach chunk position context to an error
    pub fn in_file(self, key: impl ToString, offset: u64) -> Self {
        LoadError::InFile {
            key: key.to_string(),
            offset,
            source: Box::new(self),
        }
    }

    /// True if this error (or the error it wraps) is a cancellation
    pub fn is_canceled(&self) -> bool {
        match self {
            LoadError::Canceled => true,
            LoadError::InFile { source, .. } => source.is_canceled(),
            _ => false,
        }
    }

    /// Strip positional context, returning the innermost error
    pub fn root_cause(&self) -> &LoadError {
        match self {
            LoadError::InFile { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

impl From<bincode::Error> for LoadError {
    fn from(e: bincode::Error) -> Self {
        LoadError::Serialization(e.to_string())
    }
}

impl From<csv::Error> for LoadError {
    fn from(e: csv::Error) -> Self {
        let message = e.to_string();
        match e.into_kind() {
            csv::ErrorKind::Io(err) => LoadError::Io(err),
            _ => LoadError::Syntax(message),
        }
    }
}
