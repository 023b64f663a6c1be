//! Frame model: the Start / Data / Result vocabulary of an invocation stream.
//!
//! Uses `bytes::Bytes` for zero-copy payload sharing.
//!
//! # Example
//!
//! ```
//! use streaming_invoker::protocol::{DataFrame, InputSignal};
//!
//! let frame = InputSignal::Data(DataFrame::new(0, "text/plain", "hello"));
//! assert!(frame.is_data());
//! assert_eq!(frame.kind_name(), "Data");
//! ```

use std::collections::HashMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Opening frame: the content types the caller accepts, one per output index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartFrame {
    /// Accepted content type for each result index.
    pub expected_content_types: Vec<String>,
}

impl StartFrame {
    /// Create a start frame from a list of accepted content types.
    pub fn new<I, S>(expected_content_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            expected_content_types: expected_content_types.into_iter().map(Into::into).collect(),
        }
    }
}

/// One element of one argument stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataFrame {
    /// Positional argument this element belongs to.
    pub arg_index: u32,
    /// Content type of the payload.
    pub content_type: String,
    /// Payload bytes (zero-copy via `bytes::Bytes`).
    pub payload: Bytes,
    /// Side-channel headers.
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl DataFrame {
    /// Create a data frame without headers.
    pub fn new(arg_index: u32, content_type: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            arg_index,
            content_type: content_type.into(),
            payload: payload.into(),
            headers: HashMap::new(),
        }
    }

    /// Add a header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
}

/// One element of one output stream, produced by the multiplexer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultFrame {
    /// Positional output this element belongs to.
    pub result_index: u32,
    /// Content type of the payload.
    pub content_type: String,
    /// Payload bytes.
    pub payload: Bytes,
    /// Side-channel headers (never contains the content type key).
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl ResultFrame {
    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

/// Incoming stream element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputSignal {
    /// Handshake, must come first.
    Start(StartFrame),
    /// Argument element.
    Data(DataFrame),
}

impl InputSignal {
    /// Check if this is a start frame.
    #[inline]
    pub fn is_start(&self) -> bool {
        matches!(self, InputSignal::Start(_))
    }

    /// Check if this is a data frame.
    #[inline]
    pub fn is_data(&self) -> bool {
        matches!(self, InputSignal::Data(_))
    }

    /// Frame case name, used in protocol violation messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            InputSignal::Start(_) => "Start",
            InputSignal::Data(_) => "Data",
        }
    }
}

impl From<StartFrame> for InputSignal {
    fn from(frame: StartFrame) -> Self {
        InputSignal::Start(frame)
    }
}

impl From<DataFrame> for InputSignal {
    fn from(frame: DataFrame) -> Self {
        InputSignal::Data(frame)
    }
}
