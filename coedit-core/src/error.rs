use thiserror::Error;

use crate::key::DocumentKey;

/// Errors raised by the synchronization engine.
///
/// None of these are fatal to the service: they are scoped to a single
/// document key and reported through the log.
#[derive(Debug, Error)]
pub enum CollabError {
    /// An event arrived in a state the documented event ordering rules out.
    #[error("out-of-order event for {key}: {detail}")]
    OutOfOrder { key: DocumentKey, detail: String },

    /// A buffer, replicated text or editor was expected but is gone.
    #[error("{what} unavailable for {key}")]
    Unavailable { key: DocumentKey, what: &'static str },

    /// An edit does not fit the text it is applied to.
    #[error("edit at {offset}+{delete} does not fit text of length {len}")]
    EditOutOfBounds { offset: usize, delete: usize, len: usize },

    /// An edit offset falls inside a multi-byte character.
    #[error("offset {0} is not on a character boundary")]
    NotCharBoundary(usize),

    /// The replicated text carries a non-string value a buffer cannot hold.
    #[error("embedded value at offset {0} in replicated text")]
    EmbeddedValue(usize),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("initial content request for {key} failed: {reason}")]
    Fetch { key: DocumentKey, reason: String },

    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CollabError>;
