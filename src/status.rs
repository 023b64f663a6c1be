//! Outward failure vocabulary and the mapping from [`InvokerError`].
//!
//! | Internal failure       | Code              | Message                                   |
//! |------------------------|-------------------|-------------------------------------------|
//! | protocol violation     | `InvalidArgument` | violation text                            |
//! | handle not found       | `NotFound`        | lookup text                               |
//! | input conversion       | `InvalidArgument` | [`UNSUPPORTED_MEDIA_TYPE`] + cause        |
//! | output conversion      | `InvalidArgument` | [`NOT_ACCEPTABLE`] + cause                |
//! | anything else          | `Unknown`         | cause text                                |

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::InvokerError;

/// Prefix identifying unsupported incoming media types.
pub const UNSUPPORTED_MEDIA_TYPE: &str = "Invoker: Unsupported Media Type: ";

/// Prefix identifying output media types that cannot be produced.
pub const NOT_ACCEPTABLE: &str = "Invoker: Not Acceptable: ";

/// Status code surfaced to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Code {
    /// The caller sent something the invoker cannot accept.
    InvalidArgument,
    /// The requested function does not exist.
    NotFound,
    /// Opaque internal failure.
    Unknown,
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Code::InvalidArgument => "INVALID_ARGUMENT",
            Code::NotFound => "NOT_FOUND",
            Code::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

/// Terminal failure of one invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Status {
    /// Status code.
    pub code: Code,
    /// Human readable description, possibly prefixed with a media type marker.
    pub message: String,
    /// Original failure, kept for diagnostics only.
    #[serde(skip)]
    source: Option<Arc<InvokerError>>,
}

impl Status {
    /// Create a status without an underlying cause.
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    fn with_source(code: Code, message: String, source: InvokerError) -> Self {
        Self {
            code,
            message,
            source: Some(Arc::new(source)),
        }
    }

    /// The failure this status was mapped from, if it was produced locally.
    pub fn cause(&self) -> Option<&InvokerError> {
        self.source.as_deref()
    }

    /// Whether the message carries the unsupported media type marker.
    pub fn is_unsupported_media_type(&self) -> bool {
        self.code == Code::InvalidArgument && self.message.starts_with(UNSUPPORTED_MEDIA_TYPE)
    }

    /// Whether the message carries the not acceptable marker.
    pub fn is_not_acceptable(&self) -> bool {
        self.code == Code::InvalidArgument && self.message.starts_with(NOT_ACCEPTABLE)
    }
}

impl PartialEq for Status {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code && self.message == other.message
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for Status {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl From<InvokerError> for Status {
    fn from(err: InvokerError) -> Self {
        match &err {
            InvokerError::ProtocolViolation(message) => {
                let message = message.clone();
                Status::with_source(Code::InvalidArgument, message, err)
            }
            InvokerError::HandleNotFound(message) => {
                let message = message.clone();
                Status::with_source(Code::NotFound, message, err)
            }
            InvokerError::InputConversion { .. } => {
                let message = format!("{}{}", UNSUPPORTED_MEDIA_TYPE, err);
                Status::with_source(Code::InvalidArgument, message, err)
            }
            InvokerError::OutputConversion { .. } => {
                let message = format!("{}{}", NOT_ACCEPTABLE, err);
                Status::with_source(Code::InvalidArgument, message, err)
            }
            _ => {
                tracing::error!(error = ?err, "Invocation failed: {}", err);
                let message = err.to_string();
                Status::with_source(Code::Unknown, message, err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_violation_maps_to_invalid_argument() {
        let status = Status::from(InvokerError::ProtocolViolation(
            "Expected first frame to be of type Start".into(),
        ));
        assert_eq!(status.code, Code::InvalidArgument);
        assert_eq!(status.message, "Expected first frame to be of type Start");
        assert!(!status.is_unsupported_media_type());
    }

    #[test]
    fn test_not_found() {
        let status = Status::from(InvokerError::HandleNotFound("missing".into()));
        assert_eq!(status.code, Code::NotFound);
    }

    #[test]
    fn test_input_conversion_marker() {
        let status = Status::from(InvokerError::input_conversion("bad json"));
        assert_eq!(status.code, Code::InvalidArgument);
        assert_eq!(
            status.message,
            "Invoker: Unsupported Media Type: Could not convert input"
        );
        assert!(status.is_unsupported_media_type());
        assert!(!status.is_not_acceptable());
    }

    #[test]
    fn test_output_conversion_marker() {
        let status = Status::from(InvokerError::OutputConversion { source: None });
        assert_eq!(status.message, "Invoker: Not Acceptable: Could not convert output");
        assert!(status.is_not_acceptable());
    }

    #[test]
    fn test_everything_else_is_unknown_with_cause() {
        let status = Status::from(InvokerError::Internal("boom".into()));
        assert_eq!(status.code, Code::Unknown);
        assert_eq!(status.message, "boom");
        assert!(matches!(status.cause(), Some(InvokerError::Internal(_))));
        assert!(std::error::Error::source(&status).is_some());
    }

    #[test]
    fn test_display() {
        let status = Status::new(Code::NotFound, "nope");
        assert_eq!(status.to_string(), "NOT_FOUND: nope");
    }
}
