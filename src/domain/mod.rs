//! Domain layer types for mailsweep.
//!
//! This module contains the core domain types used throughout the crate:
//! identifiers, message metadata, sender filters and the sender-domain
//! normalizer.

mod filter;
mod message;
mod sender;
mod types;

pub use filter::{system_labels, FilterAction, FilterCriteria, SenderFilter};
pub use message::{headers, Header, MessageMetadata};
pub use sender::normalize_domain;
pub use types::{Credential, MessageId, SenderDomain};
