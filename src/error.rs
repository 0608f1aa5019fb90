//! Error types and handling for rs2-pipeline
//!
//! The end of a stream is not an error: readers signal it with `Ok(None)`.
//! Everything that can go wrong (or that a fan-in wants to report) is a
//! [`StreamError`].

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Main error type for reader/writer operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// One branch of a merged reader ended while others are still live.
    ///
    /// Recoverable: calling `recv` again continues with the remaining branches.
    #[error("source `{name}` reached end of stream")]
    SourceEof { name: String },

    /// Operation attempted after an explicit close
    #[error("stream is closed")]
    Closed,

    /// The `timeout` operator fired before upstream produced anything
    #[error("stream timed out after {0:?}")]
    Timeout(Duration),

    /// Backpressure buffer would overflow under the `Error` strategy
    #[error("backpressure buffer overflow (capacity {capacity})")]
    Backpressure { capacity: usize },

    /// `concat` was asked to combine zero elements
    #[error("stream is empty")]
    Empty,

    /// A top-level helper was cancelled by its caller
    #[error("operation cancelled")]
    Cancelled,

    /// Caller supplied error, typically attached with `close_with_error`
    #[error("{0}")]
    Custom(String),
}

impl StreamError {
    /// Build a [`StreamError::Custom`] from anything printable.
    pub fn custom(msg: impl fmt::Display) -> Self {
        StreamError::Custom(msg.to_string())
    }

    /// Whether this is the recoverable per-branch signal emitted by `merge`.
    pub fn is_source_eof(&self) -> bool {
        matches!(self, StreamError::SourceEof { .. })
    }

    /// Name of the exhausted branch, if this is a [`StreamError::SourceEof`].
    pub fn source_name(&self) -> Option<&str> {
        match self {
            StreamError::SourceEof { name } => Some(name),
            _ => None,
        }
    }
}

/// Result type for reader and writer operations
pub type StreamResult<T> = Result<T, StreamError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_eof_carries_branch_name() {
        let err = StreamError::SourceEof { name: "left".into() };
        assert!(err.is_source_eof());
        assert_eq!(err.source_name(), Some("left"));
        assert_eq!(err.to_string(), "source `left` reached end of stream");
        assert!(!StreamError::Closed.is_source_eof());
        assert_eq!(StreamError::Closed.source_name(), None);
    }

    #[test]
    fn custom_keeps_message_verbatim() {
        assert_eq!(StreamError::custom("boom").to_string(), "boom");
        assert_eq!(
            StreamError::Backpressure { capacity: 4 }.to_string(),
            "backpressure buffer overflow (capacity 4)"
        );
    }
}
