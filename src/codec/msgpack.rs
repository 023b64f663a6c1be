//! MsgPack codec using `rmp-serde`.
//!
//! Always encodes with `to_vec_named`, so structs go on the wire as maps
//! keyed by field name. Frame bodies and `application/msgpack` payloads both
//! rely on that: peers in other languages decode them as plain objects.
//!
//! # Example
//!
//! ```
//! use streaming_invoker::codec::MsgPackCodec;
//! use streaming_invoker::protocol::StartFrame;
//!
//! let start = StartFrame::new(["text/plain"]);
//! let encoded = MsgPackCodec::encode(&start).unwrap();
//! let decoded: StartFrame = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, start);
//! ```

use crate::error::Result;

/// MessagePack codec for structured data.
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Encode a value to MsgPack bytes (struct-as-map format).
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be serialized.
    #[inline]
    pub fn encode<T: serde::Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    /// Decode MsgPack bytes to a value.
    ///
    /// # Errors
    ///
    /// Returns error if the bytes cannot be deserialized to type T.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}
