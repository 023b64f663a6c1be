//! Media type parsing and matching for content negotiation.
//!
//! Only `type/subtype` matters for matching; parameters such as `charset`
//! are ignored and comparison is case-insensitive.
//!
//! ```
//! use streaming_invoker::codec::{accepts, MediaType};
//!
//! let json = MediaType::parse("application/json; charset=utf-8").unwrap();
//! assert_eq!(json.to_string(), "application/json");
//! assert!(MediaType::parse("application/*").unwrap().includes(&json));
//! assert!(accepts("text/plain, application/*", "application/json"));
//! ```

use std::fmt;

/// A parsed `type/subtype` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaType {
    kind: String,
    subtype: String,
}

impl MediaType {
    /// Parse a media type, dropping parameters.
    ///
    /// Returns `None` unless both halves are present and non-empty.
    pub fn parse(value: &str) -> Option<Self> {
        let essence = value.split(';').next()?.trim();
        let (kind, subtype) = essence.split_once('/')?;
        let (kind, subtype) = (kind.trim(), subtype.trim());
        if kind.is_empty() || subtype.is_empty() {
            return None;
        }
        Some(Self {
            kind: kind.to_ascii_lowercase(),
            subtype: subtype.to_ascii_lowercase(),
        })
    }

    /// Top-level type, e.g. `application`.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Subtype, e.g. `json`.
    pub fn subtype(&self) -> &str {
        &self.subtype
    }

    /// Whether either half is `*`.
    pub fn is_wildcard(&self) -> bool {
        self.kind == "*" || self.subtype == "*"
    }

    /// Whether this (possibly wildcard) type covers `other`.
    pub fn includes(&self, other: &MediaType) -> bool {
        if self.kind == "*" {
            return true;
        }
        self.kind == other.kind && (self.subtype == "*" || self.subtype == other.subtype)
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.subtype)
    }
}

/// Whether `content_type` satisfies a comma-separated accept list.
pub fn accepts(accept: &str, content_type: &str) -> bool {
    let content_type = match MediaType::parse(content_type) {
        Some(media) => media,
        None => return false,
    };
    accept
        .split(',')
        .filter_map(MediaType::parse)
        .any(|pattern| pattern.includes(&content_type))
}

/// First concrete (non-wildcard) type in an accept list.
pub fn first_concrete(accept: &str) -> Option<MediaType> {
    accept
        .split(',')
        .filter_map(MediaType::parse)
        .find(|media| !media.is_wildcard())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let media = MediaType::parse(" Text/Plain ;charset=UTF-8").unwrap();
        assert_eq!(media.kind(), "text");
        assert_eq!(media.subtype(), "plain");

        assert!(MediaType::parse("text").is_none());
        assert!(MediaType::parse("/plain").is_none());
        assert!(MediaType::parse("").is_none());
    }

    #[test]
    fn test_wildcards() {
        let any = MediaType::parse("*/*").unwrap();
        let text_any = MediaType::parse("text/*").unwrap();
        let plain = MediaType::parse("text/plain").unwrap();
        let json = MediaType::parse("application/json").unwrap();

        assert!(any.includes(&json));
        assert!(text_any.includes(&plain));
        assert!(!text_any.includes(&json));
        assert!(!plain.includes(&text_any));
    }

    #[test]
    fn test_accepts_list() {
        assert!(accepts("application/json, text/plain", "text/plain;charset=utf-8"));
        assert!(!accepts("application/json", "text/plain"));
        assert!(!accepts("application/json", "garbage"));
    }

    #[test]
    fn test_first_concrete() {
        assert_eq!(
            first_concrete("*/*, text/*, application/json").map(|m| m.to_string()),
            Some("application/json".to_string())
        );
        assert!(first_concrete("*/*").is_none());
    }
}
