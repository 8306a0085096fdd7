//! Errors surfaced by the handler and remediation operations.

use crate::domain::{MessageId, SenderDomain};
use crate::providers::email::ProviderError;

/// Result type alias for sweep operations.
pub type SweepResult<T> = std::result::Result<T, SweepError>;

/// Errors that abort a sweep operation.
///
/// Every variant's message says what was attempted and that the action
/// can be retried in full; no partial resume is offered.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SweepError {
    /// No credential is available for this session.
    #[error("not authenticated: sign in to analyze or change the mailbox")]
    NotAuthenticated,

    /// Confirm or cancel was called with nothing awaiting confirmation.
    #[error("no deletion is awaiting confirmation")]
    NothingPending,

    /// Another deletion flow has not finished yet.
    #[error("another deletion is already in progress; finish or cancel it first")]
    DeletionInProgress,

    /// A bulk deletion was requested with an empty selection.
    #[error("no senders selected for deletion")]
    NoDomainsSelected,

    /// Message IDs for a sender could not be enumerated.
    #[error(
        "could not retrieve emails from {domain}: {source}; nothing was deleted, retry the whole action"
    )]
    Listing {
        domain: SenderDomain,
        source: ProviderError,
    },

    /// The provider rejected filter creation.
    #[error("could not create a filter for {domain}: {source}; retry to try again")]
    Filter {
        domain: SenderDomain,
        source: ProviderError,
    },

    /// A single-message trash call failed.
    #[error("could not trash email {id}: {source}")]
    Trash { id: MessageId, source: ProviderError },
}

impl SweepError {
    /// Returns the provider error behind this failure, if any.
    pub fn provider_error(&self) -> Option<&ProviderError> {
        match self {
            Self::Listing { source, .. }
            | Self::Filter { source, .. }
            | Self::Trash { source, .. } => Some(source),
            _ => None,
        }
    }
}
