//! Error types for streaming-invoker.

use thiserror::Error;

/// Message carried by input conversion failures.
pub const COULD_NOT_CONVERT_INPUT: &str = "Could not convert input";

/// Message carried by output conversion failures.
pub const COULD_NOT_CONVERT_OUTPUT: &str = "Could not convert output";

/// Main error type for all invoker operations.
#[derive(Debug, Error)]
pub enum InvokerError {
    /// Frame sequence does not follow the protocol (missing Start, bad index, ...).
    #[error("{0}")]
    ProtocolViolation(String),

    /// The registry could not resolve the requested function.
    #[error("{0}")]
    HandleNotFound(String),

    /// An argument payload could not be converted for the handle.
    #[error("Could not convert input")]
    InputConversion {
        /// Underlying conversion failure, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A handle output could not be converted to an accepted content type.
    #[error("Could not convert output")]
    OutputConversion {
        /// Underlying conversion failure, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Anything unanticipated raised by the handle or the pipeline.
    #[error("{0}")]
    Internal(String),

    /// I/O error on the connection.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// Connection closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,
}

impl InvokerError {
    /// Input conversion failure wrapping its cause.
    pub fn input_conversion<E>(cause: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        InvokerError::InputConversion {
            source: Some(cause.into()),
        }
    }

    /// Output conversion failure wrapping its cause.
    pub fn output_conversion<E>(cause: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        InvokerError::OutputConversion {
            source: Some(cause.into()),
        }
    }

    /// A copy for a second consumer of the same failure.
    ///
    /// Variant and message are kept; an underlying source survives only as text.
    pub fn duplicate(&self) -> Self {
        match self {
            InvokerError::ProtocolViolation(m) => InvokerError::ProtocolViolation(m.clone()),
            InvokerError::HandleNotFound(m) => InvokerError::HandleNotFound(m.clone()),
            InvokerError::InputConversion { source } => InvokerError::InputConversion {
                source: source.as_ref().map(|e| e.to_string().into()),
            },
            InvokerError::OutputConversion { source } => InvokerError::OutputConversion {
                source: source.as_ref().map(|e| e.to_string().into()),
            },
            InvokerError::Internal(m) => InvokerError::Internal(m.clone()),
            InvokerError::Io(e) => InvokerError::Io(std::io::Error::new(e.kind(), e.to_string())),
            InvokerError::ConnectionClosed => InvokerError::ConnectionClosed,
            other => InvokerError::Internal(other.to_string()),
        }
    }
}

/// Result type alias using InvokerError.
pub type Result<T> = std::result::Result<T, InvokerError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_conversion_messages() {
        let input = InvokerError::input_conversion("bad utf-8");
        assert_eq!(input.to_string(), COULD_NOT_CONVERT_INPUT);
        assert_eq!(input.source().unwrap().to_string(), "bad utf-8");

        let output = InvokerError::OutputConversion { source: None };
        assert_eq!(output.to_string(), COULD_NOT_CONVERT_OUTPUT);
        assert!(output.source().is_none());
    }

    #[test]
    fn test_io_from() {
        let err: InvokerError = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone").into();
        assert!(matches!(err, InvokerError::Io(_)));
    }

    #[test]
    fn test_duplicate_keeps_variant_and_message() {
        let reset = InvokerError::Io(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset"));
        match reset.duplicate() {
            InvokerError::Io(e) => {
                assert_eq!(e.kind(), std::io::ErrorKind::ConnectionReset);
                assert_eq!(e.to_string(), "reset");
            }
            other => panic!("unexpected {:?}", other),
        }

        let input = InvokerError::input_conversion("bad utf-8").duplicate();
        assert_eq!(input.to_string(), COULD_NOT_CONVERT_INPUT);
        assert_eq!(input.source().unwrap().to_string(), "bad utf-8");

        let json = serde_json::from_str::<i64>("x").unwrap_err();
        let copy = InvokerError::Json(json).duplicate();
        assert!(matches!(copy, InvokerError::Internal(ref m) if m.starts_with("JSON error")));
    }
}
