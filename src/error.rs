//! Error types for the OBEX engine.

use thiserror::Error;

use crate::protocol::ValueKind;

/// Main error type for all OBEX engine operations.
#[derive(Debug, Error)]
pub enum ObexError {
    /// A header value was accessed through the accessor of another kind.
    #[error("Type mismatch: expected {expected:?} value, found {actual:?}")]
    TypeMismatch {
        /// Kind the caller asked for.
        expected: ValueKind,
        /// Kind the value actually holds.
        actual: ValueKind,
    },

    /// Buffer offset or value outside the permitted bounds.
    #[error("Out of range: {0}")]
    OutOfRange(String),

    /// Invalid Unicode/ByteSequence length or missing string terminator.
    #[error("Malformed header: {0}")]
    MalformedHeader(String),

    /// Response with no matching request, or inconsistent frame length.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Send/receive failure reported by the transport.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The peer answered with a code other than the ones the operation accepts.
    #[error("Response error: {0:#04x}")]
    ResponseError(u8),

    /// I/O error on the underlying byte stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error while loading configuration.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Connection closed before the operation completed.
    #[error("Connection closed")]
    ConnectionClosed,
}

/// Result type alias using ObexError.
pub type Result<T> = std::result::Result<T, ObexError>;

impl ObexError {
    /// Recast as a [`ObexError::Transport`], keeping an existing transport message.
    pub fn into_transport(self) -> Self {
        match self {
            Self::Transport(message) => Self::Transport(message),
            Self::Io(e) => Self::Transport(e.to_string()),
            other => Self::Transport(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_transport_does_not_nest_messages() {
        let err = ObexError::Transport("writer task failed".into()).into_transport();
        assert_eq!(err.to_string(), "Transport error: writer task failed");

        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "link lost");
        let err = ObexError::from(io).into_transport();
        assert_eq!(err.to_string(), "Transport error: link lost");
    }

    #[test]
    fn test_response_error_renders_hex_code() {
        let err = ObexError::ResponseError(0x44);
        assert_eq!(err.to_string(), "Response error: 0x44");
    }

    #[test]
    fn test_type_mismatch_names_both_kinds() {
        let err = ObexError::TypeMismatch {
            expected: ValueKind::Int32,
            actual: ValueKind::Unicode,
        };
        let text = err.to_string();
        assert!(text.contains("Int32"));
        assert!(text.contains("Unicode"));
    }
}
