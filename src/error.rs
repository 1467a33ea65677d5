use std::io;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by the store, the journal, and the wire boundary.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Journal file could not be opened, read, or appended to.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// Structural corruption: a broken sibling chain, a replay record
    /// referencing an unknown id, a removal that removed nothing. Fatal —
    /// the process must not continue past it.
    #[error("corruption detected: {0}")]
    Corruption(String),
    /// Malformed or unroutable request at the wire boundary.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// A request payload that could not be decoded at all.
    #[error("request parse fault: {0}")]
    ParseFault(String),
    /// Database name outside the allowed character set.
    #[error("illegal database name: {0:?}")]
    IllegalName(String),
    /// Operation recognized but not implemented.
    #[error("unsupported feature: {0}")]
    Unsupported(&'static str),
}

impl StoreError {
    /// True for errors the top-level loop must treat as fail-stop rather
    /// than answer with a sentinel response.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::Corruption(_))
    }
}
