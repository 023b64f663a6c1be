//! Wire format encoding and decoding.
//!
//! Every frame is a 5-byte header followed by a MsgPack body:
//! ```text
//! ┌───────┬──────────┐
//! │ Kind  │ Length   │
//! │ 1 byte│ 4 bytes  │
//! │       │ uint32 BE│
//! └───────┴──────────┘
//! ```
//!
//! All multi-byte integers are Big Endian.

use crate::error::{InvokerError, Result};

/// Header size in bytes (fixed, exactly 5).
pub const HEADER_SIZE: usize = 5;

/// Default maximum body size (64 MB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: u32 = 64 * 1024 * 1024;

/// Frame kind constants.
pub mod kind {
    /// Start frame (client to invoker).
    pub const START: u8 = 0x01;
    /// Data frame (client to invoker).
    pub const DATA: u8 = 0x02;
    /// Result frame (invoker to client).
    pub const RESULT: u8 = 0x03;
    /// Terminal error, body is a status (invoker to client).
    pub const ERROR: u8 = 0x04;
    /// Clean completion, empty body (invoker to client).
    pub const END: u8 = 0x05;

    /// Check whether a kind byte is defined.
    #[inline]
    pub fn is_known(kind: u8) -> bool {
        (START..=END).contains(&kind)
    }

    /// Human readable kind name.
    pub fn name(kind: u8) -> &'static str {
        match kind {
            START => "Start",
            DATA => "Data",
            RESULT => "Result",
            ERROR => "Error",
            END => "End",
            _ => "Unknown",
        }
    }
}

/// Decoded header from wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Frame kind (see `kind` module).
    pub kind: u8,
    /// Body length in bytes.
    pub payload_length: u32,
}

impl Header {
    /// Create a new header.
    pub fn new(kind: u8, payload_length: u32) -> Self {
        Self {
            kind,
            payload_length,
        }
    }

    /// Encode header to bytes (Big Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use streaming_invoker::protocol::{kind, Header};
    ///
    /// let header = Header::new(kind::DATA, 100);
    /// assert_eq!(header.encode(), [0x02, 0, 0, 0, 100]);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0] = self.kind;
        buf[1..5].copy_from_slice(&self.payload_length.to_be_bytes());
        buf
    }

    /// Decode header from bytes.
    ///
    /// Returns `None` if buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            kind: buf[0],
            payload_length: u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]),
        })
    }

    /// Validate the header for protocol compliance.
    ///
    /// Checks:
    /// - Kind is a defined frame kind
    /// - Payload length doesn't exceed max
    pub fn validate(&self, max_payload_size: u32) -> Result<()> {
        if !kind::is_known(self.kind) {
            return Err(InvokerError::ProtocolViolation(format!(
                "Unknown frame kind 0x{:02x}",
                self.kind
            )));
        }

        if self.payload_length > max_payload_size {
            return Err(InvokerError::ProtocolViolation(format!(
                "Payload size {} exceeds maximum {}",
                self.payload_length, max_payload_size
            )));
        }

        Ok(())
    }
}
