//! Message metadata domain types.
//!
//! The core only ever looks at a small header subset of a message; bodies
//! are never fetched.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use super::{normalize_domain, MessageId, SenderDomain};

/// Header names requested when fetching message metadata.
pub mod headers {
    pub const FROM: &str = "From";
    pub const DATE: &str = "Date";
    pub const SUBJECT: &str = "Subject";
}

/// A single message header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Header name as returned by the provider.
    pub name: String,
    /// Raw header value.
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Header subset of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageMetadata {
    /// Provider-assigned message ID.
    pub id: MessageId,
    /// Headers returned for the requested names.
    pub headers: Vec<Header>,
}

impl MessageMetadata {
    pub fn new(id: impl Into<MessageId>, headers: Vec<Header>) -> Self {
        Self {
            id: id.into(),
            headers,
        }
    }

    /// Looks up a header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    pub fn from_header(&self) -> Option<&str> {
        self.header(headers::FROM)
    }

    pub fn subject(&self) -> Option<&str> {
        self.header(headers::SUBJECT)
    }

    /// Parses the `Date` header as RFC 2822, if present and well formed.
    pub fn date(&self) -> Option<DateTime<FixedOffset>> {
        self.header(headers::DATE)
            .and_then(|d| DateTime::parse_from_rfc2822(d.trim()).ok())
    }

    /// Returns the sender domain, or `None` when the `From` header is missing.
    ///
    /// A present but unparseable `From` yields the unknown-sender sentinel.
    pub fn sender_domain(&self) -> Option<SenderDomain> {
        self.from_header().map(|from| normalize_domain(Some(from)))
    }
}
