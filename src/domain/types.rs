//! Core identifier types for domain entities.
//!
//! These newtype wrappers provide type safety for identifiers and keys,
//! preventing accidental mixing of message IDs, sender domains and tokens.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Provider-assigned identifier for an individual message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Canonical registrable domain a message was sent from.
///
/// Values are produced by [`normalize_domain`](super::normalize_domain);
/// constructing one by hand is allowed for lookups and selections.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SenderDomain(pub String);

impl SenderDomain {
    /// Sentinel key for headers that carry no parseable address.
    pub const UNKNOWN: &'static str = "unknown_sender";

    /// Returns the sentinel domain for unparseable senders.
    pub fn unknown() -> Self {
        Self(Self::UNKNOWN.to_owned())
    }

    /// Returns true if this is the unparseable-sender sentinel.
    pub fn is_unknown(&self) -> bool {
        self.0 == Self::UNKNOWN
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SenderDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SenderDomain {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SenderDomain {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Opaque OAuth bearer token for the current session.
///
/// Owned by the caller and lent to every core operation. The token is
/// never logged: `Debug` prints a redacted placeholder.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the raw bearer token.
    pub fn token(&self) -> &str {
        &self.0
    }

    /// Returns true if the token is empty or whitespace.
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}
