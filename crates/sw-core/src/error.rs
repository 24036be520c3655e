//! Unified error type for the scheduler.
//!
//! Every failure surfaced by a queue handler or the scheduler itself funnels
//! into [`Error`]. Cancellation has its own variant so callers can log it at
//! a lower severity than a genuine failure and never retry it.

use std::fmt;

use crate::work::QueueKind;

/// Unified error type covering all failure modes in the scheduler.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested entity could not be found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "item", "season").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// Configuration or input data failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The operation observed a cancellation request and stopped early.
    #[error("Cancelled")]
    Cancelled,

    /// A queue handler (reduce, unit of work, season aggregation) failed.
    #[error("Handler error [{queue}]: {message}")]
    Handler {
        /// The queue whose handler failed.
        queue: QueueKind,
        /// Human-readable error description.
        message: String,
    },

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error represents cooperative cancellation rather than a
    /// failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Handler`].
    pub fn handler(queue: QueueKind, message: impl Into<String>) -> Self {
        Error::Handler {
            queue,
            message: message.into(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
