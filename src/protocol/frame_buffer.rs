//! Frame buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for zero-copy buffer management.
//! Implements a state machine for handling fragmented frames:
//! - `WaitingForHeader`: Need at least 5 bytes
//! - `WaitingForPayload`: Header parsed, need N more body bytes
//!
//! # Example
//!
//! ```
//! use streaming_invoker::protocol::{encode_input, FrameBuffer, InputSignal, StartFrame};
//!
//! let bytes = encode_input(&InputSignal::Start(StartFrame::new(["text/plain"]))).unwrap();
//!
//! let mut buffer = FrameBuffer::new();
//! assert!(buffer.push(&bytes[..3]).unwrap().is_empty());
//! let frames = buffer.push(&bytes[3..]).unwrap();
//! assert_eq!(frames.len(), 1);
//! ```

use bytes::{Bytes, BytesMut};

use super::envelope::RawFrame;
use super::wire_format::{Header, DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE};
use crate::error::Result;

/// State machine for frame parsing.
#[derive(Debug, Clone)]
enum State {
    /// Waiting for complete header.
    WaitingForHeader,
    /// Header parsed, waiting for body bytes.
    WaitingForPayload { header: Header, remaining: u32 },
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
pub struct FrameBuffer {
    /// Accumulated bytes from socket reads.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
    /// Maximum allowed body size.
    max_payload_size: u32,
}

impl FrameBuffer {
    /// Create a new frame buffer with default settings.
    ///
    /// Default capacity: 64KB, max payload: 64MB.
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD_SIZE)
    }

    /// Create a new frame buffer with custom max payload size.
    pub fn with_max_payload(max_payload_size: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            state: State::WaitingForHeader,
            max_payload_size,
        }
    }

    /// Push data into the buffer and extract all complete frames.
    ///
    /// Partial data is buffered internally for the next push.
    ///
    /// # Errors
    ///
    /// Returns error on an unknown frame kind or an oversized body.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<RawFrame>> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.try_extract_one()? {
            frames.push(frame);
        }

        Ok(frames)
    }

    fn try_extract_one(&mut self) -> Result<Option<RawFrame>> {
        loop {
            match self.state {
                State::WaitingForHeader => {
                    let header = match Header::decode(&self.buffer) {
                        Some(header) => header,
                        None => return Ok(None),
                    };
                    header.validate(self.max_payload_size)?;

                    let _ = self.buffer.split_to(HEADER_SIZE);

                    if header.payload_length == 0 {
                        return Ok(Some(RawFrame::new(header, Bytes::new())));
                    }

                    self.state = State::WaitingForPayload {
                        header,
                        remaining: header.payload_length,
                    };
                }

                State::WaitingForPayload { header, remaining } => {
                    let remaining = remaining as usize;
                    if self.buffer.len() < remaining {
                        return Ok(None);
                    }

                    let body = self.buffer.split_to(remaining).freeze();
                    self.state = State::WaitingForHeader;

                    return Ok(Some(RawFrame::new(header, body)));
                }
            }
        }
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Check whether a frame is partially buffered.
    pub fn has_partial_frame(&self) -> bool {
        !self.buffer.is_empty() || matches!(self.state, State::WaitingForPayload { .. })
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InvokerError;
    use crate::protocol::{decode_input, encode_input, kind, DataFrame, InputSignal};

    fn data_bytes(index: u32, payload: &'static str) -> Vec<u8> {
        encode_input(&InputSignal::Data(DataFrame::new(index, "text/plain", payload))).unwrap()
    }

    #[test]
    fn test_multiple_frames_in_one_push() {
        let mut bytes = data_bytes(0, "a");
        bytes.extend(data_bytes(1, "b"));

        let mut buffer = FrameBuffer::new();
        let frames = buffer.push(&bytes).unwrap();

        assert_eq!(frames.len(), 2);
        assert!(buffer.is_empty());
        let second = decode_input(&frames[1]).unwrap();
        assert_eq!(second, InputSignal::Data(DataFrame::new(1, "text/plain", "b")));
    }

    #[test]
    fn test_byte_by_byte() {
        let bytes = data_bytes(3, "payload");
        let mut buffer = FrameBuffer::new();

        let mut frames = Vec::new();
        for byte in &bytes {
            frames.extend(buffer.push(std::slice::from_ref(byte)).unwrap());
        }

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].header.kind, kind::DATA);
        assert!(!buffer.has_partial_frame());
    }

    #[test]
    fn test_partial_frame_is_tracked() {
        let bytes = data_bytes(0, "abc");
        let mut buffer = FrameBuffer::new();

        assert!(buffer.push(&bytes[..HEADER_SIZE + 1]).unwrap().is_empty());
        assert!(buffer.has_partial_frame());
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_empty_body_frame() {
        let mut buffer = FrameBuffer::new();
        let frames = buffer.push(&Header::new(kind::END, 0).encode()).unwrap();

        assert_eq!(frames.len(), 1);
        assert!(frames[0].body.is_empty());
    }

    #[test]
    fn test_oversized_body_rejected() {
        let mut buffer = FrameBuffer::with_max_payload(4);
        let result = buffer.push(&Header::new(kind::DATA, 5).encode());

        assert!(matches!(result, Err(InvokerError::ProtocolViolation(_))));
    }
}
