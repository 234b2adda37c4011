//! # AppError
//!
//! Centralized error handling for Jokebox.
//! Adapters speak `anyhow`; everything above the ports speaks `AppError`.

use thiserror::Error;

/// The primary error type for all jb-core operations.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (e.g., Joke, Punchline, User)
    #[error("{0} not found with ID {1}")]
    NotFound(String, String),

    /// Validation failure (e.g., empty setup, username too long)
    #[error("validation error: {0}")]
    ValidationError(String),

    /// An operation needs a signed-in user
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// A stored document could not be turned into a model
    #[error("malformed document {id}: {reason}")]
    Decode { id: String, reason: String },

    /// The remote document or blob store failed
    #[error("remote store error: {0}")]
    Remote(#[source] anyhow::Error),

    /// Local cache read or write failed
    #[error("cache error: {0}")]
    Cache(String),

    /// Image could not be decoded or encoded
    #[error("image error: {0}")]
    Image(String),
}

impl AppError {
    pub fn not_found(kind: &str, id: impl Into<String>) -> Self {
        Self::NotFound(kind.to_string(), id.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError(message.into())
    }

    pub fn decode(id: impl Into<String>, reason: impl ToString) -> Self {
        Self::Decode {
            id: id.into(),
            reason: reason.to_string(),
        }
    }

    /// True for failures that came from the network side.
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }
}

/// A specialized Result type for Jokebox logic.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_errors_keep_their_source_message() {
        let err = AppError::Remote(anyhow::anyhow!("connection reset"));
        assert!(err.is_remote());
        assert_eq!(err.to_string(), "remote store error: connection reset");
    }

    #[test]
    fn not_found_names_kind_and_id() {
        let err = AppError::not_found("Joke", "j1");
        assert_eq!(err.to_string(), "Joke not found with ID j1");
        assert!(!err.is_remote());
    }
}
