//! Payload conversion by content type.
//!
//! Handles use [`ContentCodec`] to turn argument messages into their own
//! types and results back into messages. Failures surface as the conversion
//! errors the invoker reports as unsupported media type / not acceptable.
//!
//! | Content type                                   | Format                       |
//! |------------------------------------------------|------------------------------|
//! | `text/plain`                                   | UTF-8; non-strings as JSON   |
//! | `application/json`                             | JSON                         |
//! | `application/msgpack`, `application/x-msgpack` | MessagePack (named fields)   |

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::media::MediaType;
use super::MsgPackCodec;
use crate::error::{InvokerError, Result};
use crate::message::Message;

/// Supported payload formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// `text/plain`.
    Text,
    /// `application/json`.
    Json,
    /// `application/msgpack`.
    MsgPack,
}

impl Format {
    /// Format for a content type, if supported.
    pub fn for_content_type(content_type: &str) -> Option<Self> {
        let media = MediaType::parse(content_type)?;
        match (media.kind(), media.subtype()) {
            ("text", "plain") => Some(Format::Text),
            ("application", "json") => Some(Format::Json),
            ("application", "msgpack") | ("application", "x-msgpack") => Some(Format::MsgPack),
            _ => None,
        }
    }
}

/// Content-type driven payload codec.
pub struct ContentCodec;

impl ContentCodec {
    /// Whether a content type can be converted.
    pub fn supports(content_type: &str) -> bool {
        Format::for_content_type(content_type).is_some()
    }

    /// Convert an argument message into `T`.
    ///
    /// # Errors
    ///
    /// [`InvokerError::InputConversion`] if the content type is missing or
    /// unsupported, or the payload does not parse.
    pub fn decode<T: DeserializeOwned>(message: &Message) -> Result<T> {
        let content_type = message
            .content_type()
            .ok_or_else(|| InvokerError::input_conversion("message has no content type"))?;
        let format = Format::for_content_type(content_type).ok_or_else(|| {
            InvokerError::input_conversion(format!("unsupported content type {}", content_type))
        })?;

        let payload = message.payload();
        match format {
            Format::Text => {
                let text = std::str::from_utf8(payload).map_err(InvokerError::input_conversion)?;
                serde_json::from_value(Value::String(text.to_string()))
                    .or_else(|_| serde_json::from_str(text))
                    .map_err(InvokerError::input_conversion)
            }
            Format::Json => serde_json::from_slice(payload).map_err(InvokerError::input_conversion),
            Format::MsgPack => MsgPackCodec::decode(payload).map_err(InvokerError::input_conversion),
        }
    }

    /// Convert `value` into a message of the given content type.
    ///
    /// # Errors
    ///
    /// [`InvokerError::OutputConversion`] if the content type is unsupported
    /// or the value cannot be serialized.
    pub fn encode<T: Serialize + ?Sized>(value: &T, content_type: &str) -> Result<Message> {
        let format = Format::for_content_type(content_type).ok_or_else(|| {
            InvokerError::output_conversion(format!("unsupported content type {}", content_type))
        })?;

        let payload = match format {
            Format::Text => match serde_json::to_value(value).map_err(InvokerError::output_conversion)? {
                Value::String(text) => text.into_bytes(),
                other => other.to_string().into_bytes(),
            },
            Format::Json => serde_json::to_vec(value).map_err(InvokerError::output_conversion)?,
            Format::MsgPack => MsgPackCodec::encode(value).map_err(InvokerError::output_conversion)?,
        };

        Ok(Message::with_content_type(payload, content_type))
    }
}
