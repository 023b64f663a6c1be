//! Payload plus headers, the unit values flowing through argument and output streams.
//!
//! The content type travels as an ordinary header under [`CONTENT_TYPE`]. When a
//! message becomes a [`ResultFrame`] the header is promoted to the frame's own
//! content type field.

use std::collections::HashMap;

use bytes::Bytes;

use crate::protocol::{DataFrame, ResultFrame};

/// Header key holding the content type.
pub const CONTENT_TYPE: &str = "contentType";

/// A payload with string headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    payload: Bytes,
    headers: HashMap<String, String>,
}

impl Message {
    /// Create a message without headers.
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
            headers: HashMap::new(),
        }
    }

    /// Create a message with the given content type.
    pub fn with_content_type(payload: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        Self::new(payload).header(CONTENT_TYPE, content_type)
    }

    /// Set a header, replacing any previous value.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get a clone of the payload as Bytes (cheap, zero-copy).
    #[inline]
    pub fn payload_bytes(&self) -> Bytes {
        self.payload.clone()
    }

    /// All headers, including the content type.
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Look up a single header.
    pub fn get_header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    /// Content type header, if set.
    pub fn content_type(&self) -> Option<&str> {
        self.get_header(CONTENT_TYPE)
    }

    /// Set the content type header.
    pub fn set_content_type(&mut self, content_type: impl Into<String>) {
        self.headers.insert(CONTENT_TYPE.to_string(), content_type.into());
    }

    /// Build a result frame for the given output index.
    ///
    /// Returns `None` when the message carries no content type.
    pub fn into_result_frame(mut self, result_index: u32) -> Option<ResultFrame> {
        let content_type = self.headers.remove(CONTENT_TYPE)?;
        Some(ResultFrame {
            result_index,
            content_type,
            payload: self.payload,
            headers: self.headers,
        })
    }
}

impl From<DataFrame> for Message {
    /// The frame's declared content type wins; frame headers only fill in what is absent.
    fn from(frame: DataFrame) -> Self {
        let mut headers = HashMap::with_capacity(frame.headers.len() + 1);
        headers.insert(CONTENT_TYPE.to_string(), frame.content_type);
        for (key, value) in frame.headers {
            headers.entry(key).or_insert(value);
        }
        Self {
            payload: frame.payload,
            headers,
        }
    }
}
