//! Error handling utilities shared across the crate.

use std::path::PathBuf;

use thiserror::Error;

use crate::model::TokenId;

/// Convenient result type used throughout the crate.
pub type Result<T, E = BytepairError> = std::result::Result<T, E>;

/// Domain-specific error describing precondition failures, corrupted training state, and IO.
///
/// The precondition variants are programmer errors raised at the call site of
/// [`HeapMap`](crate::heap_map::HeapMap) and [`LinkedArray`](crate::linked_array::LinkedArray)
/// operations.  [`BytepairError::CorruptToken`] and [`BytepairError::Internal`] mean the
/// incremental bookkeeping has drifted from the token stream and the run must be abandoned.
#[derive(Debug, Error)]
pub enum BytepairError {
    /// Training configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A queue operation referenced a key that is not present.
    #[error("key {0} is not present in the queue")]
    MissingKey(String),
    /// A key was pushed while already present in the queue.
    #[error("key {0} is already present in the queue")]
    DuplicateKey(String),
    /// The maximum of an empty queue was requested.
    #[error("the queue is empty")]
    EmptyQueue,
    /// A sequence index lies outside the original allocation.
    #[error("index {index} is out of range for a sequence of capacity {capacity}")]
    IndexOutOfRange {
        /// Offending index.
        index: usize,
        /// Number of slots allocated when the sequence was filled.
        capacity: usize,
    },
    /// A sequence index refers to an element that was merged away.
    #[error("index {0} refers to an element that was merged away")]
    RetiredIndex(usize),
    /// The element at the index is the head of the sequence.
    #[error("index {0} has no predecessor")]
    NoPredecessor(usize),
    /// The element at the index is the tail of the sequence (or adjacent to it).
    #[error("index {0} has no successor")]
    NoSuccessor(usize),
    /// `fill` was called on a sequence that already holds elements.
    #[error("sequence has already been filled")]
    AlreadyFilled,
    /// A token read from the sequence has no production in the grammar.
    #[error("token {token} at index {index} has no production (grammar length {grammar_len})")]
    CorruptToken {
        /// Sequence index the token was read from.
        index: usize,
        /// Token value found at the index.
        token: TokenId,
        /// Grammar length at the time of the read.
        grammar_len: usize,
    },
    /// Filesystem IO error with optional context path.
    #[error("io error while processing {path:?}: {source}")]
    Io {
        /// Underlying IO error returned by the standard library.
        source: std::io::Error,
        /// Target path associated with the IO failure if available.
        path: Option<PathBuf>,
    },
    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// Catch-all variant for invariants that should not occur.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for BytepairError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl BytepairError {
    /// Helper constructor that attaches an optional path when wrapping IO errors.
    pub fn io(source: std::io::Error, path: Option<PathBuf>) -> Self {
        Self::Io { source, path }
    }

    /// Returns true for errors signalling that the training state is corrupted.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::CorruptToken { .. } | Self::Internal(_))
    }
}
