//! Error types for connection-level dispatch failures.
//!
//! These cover problems with the JSONL stream itself. Failures of an
//! individual facade call are [`FacadeError`](crate::registry::FacadeError)
//! values and never reach this type.

use std::io;

use keel_rpc_types::{ErrorBody, ErrorCode};
use thiserror::Error;

/// Errors surfaced while reading, parsing, or answering request lines.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Request line could not be parsed as valid JSON.
    #[error("malformed JSONL: {message}")]
    MalformedJsonl {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    /// Request JSON does not match the request envelope.
    #[error("invalid request structure: {message}")]
    InvalidStructure { message: String },

    /// Request exceeds the maximum allowed size.
    #[error("request too large: {size} bytes exceeds {max_size} byte limit")]
    RequestTooLarge { size: usize, max_size: usize },

    /// IO error during read or write.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Response serialization failed.
    #[error("failed to serialize response: {0}")]
    SerializeResponse(#[from] serde_json::Error),

    /// Internal error (e.g., lock poisoned).
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl DispatchError {
    /// Wire classification of the error.
    ///
    /// Problems with what the client sent are bad requests; everything else
    /// is internal.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::MalformedJsonl { .. }
            | Self::InvalidStructure { .. }
            | Self::RequestTooLarge { .. } => ErrorCode::BadRequest,
            Self::Io(_) | Self::SerializeResponse(_) | Self::Internal { .. } => {
                ErrorCode::Internal
            }
        }
    }

    /// Whether the connection must be closed after reporting the error.
    ///
    /// An oversized line leaves the stream at an unknown position, so the
    /// session cannot resynchronise on the next newline.
    pub fn closes_connection(&self) -> bool {
        matches!(self, Self::RequestTooLarge { .. } | Self::Io(_))
    }

    /// Converts the error into its wire form.
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody::new(self.code(), self.to_string())
    }

    /// Creates a malformed JSONL error from a serde error.
    pub fn from_json_error(source: serde_json::Error) -> Self {
        Self::MalformedJsonl {
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Creates an invalid structure error.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }

    /// Creates a request too large error.
    pub fn request_too_large(size: usize, max_size: usize) -> Self {
        Self::RequestTooLarge { size, max_size }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(
        DispatchError::from_json_error(
            serde_json::from_str::<serde_json::Value>("nope").expect_err("not json")
        ),
        ErrorCode::BadRequest,
        false
    )]
    #[case(DispatchError::invalid_structure("no method"), ErrorCode::BadRequest, false)]
    #[case(DispatchError::request_too_large(9, 4), ErrorCode::BadRequest, true)]
    #[case(DispatchError::internal("poisoned"), ErrorCode::Internal, false)]
    fn classifies_stream_errors(
        #[case] error: DispatchError,
        #[case] code: ErrorCode,
        #[case] closes: bool,
    ) {
        assert_eq!(error.code(), code);
        assert_eq!(error.closes_connection(), closes);
        assert_eq!(error.to_body().code, code);
    }
}
