//! Protocol module - frame model, wire format, and framing.
//!
//! This module implements the frame vocabulary of an invocation stream:
//! - Start / Data / Result frame types
//! - 5-byte header encoding/decoding
//! - Frame buffer for accumulating partial reads
//! - Envelope encoding of typed frames

mod envelope;
mod frame;
mod frame_buffer;
mod wire_format;

pub use envelope::{
    decode_input, decode_output, encode_end, encode_input, encode_output, OutputSignal, RawFrame,
};
pub use frame::{DataFrame, InputSignal, ResultFrame, StartFrame};
pub use frame_buffer::FrameBuffer;
pub use wire_format::{kind, Header, DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE};
