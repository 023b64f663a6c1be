//! Codec module - serialization for frame bodies and message payloads.
//!
//! - [`MsgPackCodec`] - MessagePack using `rmp-serde` (`to_vec_named`), used for frame bodies
//! - [`ContentCodec`] - converts [`Message`](crate::Message) payloads by content type
//! - [`MediaType`] - parsing and wildcard matching for content negotiation
//!
//! # Design
//!
//! Codecs are marker structs with static methods rather than trait objects,
//! so the format is picked at the call site.
//!
//! # Example
//!
//! ```
//! use streaming_invoker::codec::ContentCodec;
//! use streaming_invoker::Message;
//!
//! let message = ContentCodec::encode(&[1, 2, 3], "application/json").unwrap();
//! assert_eq!(message.payload(), b"[1,2,3]");
//!
//! let numbers: Vec<u8> = ContentCodec::decode(&message).unwrap();
//! assert_eq!(numbers, vec![1, 2, 3]);
//! ```

mod content;
mod media;
mod msgpack;

pub use content::{ContentCodec, Format};
pub use media::{accepts, first_concrete, MediaType};
pub use msgpack::MsgPackCodec;
