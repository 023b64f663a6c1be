//! Conversion between typed frames and their wire envelopes.
//!
//! Bodies are MsgPack with named fields (see [`MsgPackCodec`]).

use bytes::Bytes;

use super::frame::{InputSignal, ResultFrame};
use super::wire_format::{kind, Header, HEADER_SIZE};
use crate::codec::MsgPackCodec;
use crate::error::{InvokerError, Result};
use crate::status::Status;

/// A frame as read off the wire: header plus undecoded body.
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Decoded header.
    pub header: Header,
    /// Body bytes.
    pub body: Bytes,
}

impl RawFrame {
    /// Create a raw frame from header and body.
    pub fn new(header: Header, body: Bytes) -> Self {
        Self { header, body }
    }
}

/// Element of the stream the invoker sends back.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputSignal {
    /// One output element.
    Result(ResultFrame),
    /// Terminal failure.
    Error(Status),
    /// Clean completion.
    End,
}

fn build(kind: u8, body: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + body.len());
    buf.extend_from_slice(&Header::new(kind, body.len() as u32).encode());
    buf.extend_from_slice(body);
    buf
}

/// Encode an incoming-side frame (used by callers of the invoker).
pub fn encode_input(signal: &InputSignal) -> Result<Vec<u8>> {
    match signal {
        InputSignal::Start(start) => Ok(build(kind::START, &MsgPackCodec::encode(start)?)),
        InputSignal::Data(data) => Ok(build(kind::DATA, &MsgPackCodec::encode(data)?)),
    }
}

/// Decode an incoming-side frame.
pub fn decode_input(frame: &RawFrame) -> Result<InputSignal> {
    match frame.header.kind {
        kind::START => Ok(InputSignal::Start(MsgPackCodec::decode(&frame.body)?)),
        kind::DATA => Ok(InputSignal::Data(MsgPackCodec::decode(&frame.body)?)),
        other => Err(InvokerError::ProtocolViolation(format!(
            "Expected Start or Data frame, got {}",
            kind::name(other)
        ))),
    }
}

/// Encode an END frame.
///
/// Sent by the invoker on clean completion; a caller may send one to mark
/// the end of its input instead of half-closing the connection.
pub fn encode_end() -> Vec<u8> {
    build(kind::END, &[])
}

/// Encode an outgoing-side frame.
pub fn encode_output(signal: &OutputSignal) -> Result<Vec<u8>> {
    match signal {
        OutputSignal::Result(result) => Ok(build(kind::RESULT, &MsgPackCodec::encode(result)?)),
        OutputSignal::Error(status) => Ok(build(kind::ERROR, &MsgPackCodec::encode(status)?)),
        OutputSignal::End => Ok(encode_end()),
    }
}

/// Decode an outgoing-side frame.
pub fn decode_output(frame: &RawFrame) -> Result<OutputSignal> {
    match frame.header.kind {
        kind::RESULT => Ok(OutputSignal::Result(MsgPackCodec::decode(&frame.body)?)),
        kind::ERROR => Ok(OutputSignal::Error(MsgPackCodec::decode(&frame.body)?)),
        kind::END => Ok(OutputSignal::End),
        other => Err(InvokerError::ProtocolViolation(format!(
            "Expected Result, Error or End frame, got {}",
            kind::name(other)
        ))),
    }
}
