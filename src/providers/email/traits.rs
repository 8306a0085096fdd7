//! Mail API trait definition.
//!
//! This module defines the [`MailApi`] trait, the narrow set of mailbox
//! calls the scanner and the remediation engine need. Implementations are
//! thin and retry-free: every method is one network round-trip, and the
//! caller decides whether a failure is worth retrying.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{Credential, MessageId, MessageMetadata, SenderFilter};

/// Result type alias for mail API operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

/// Errors that can occur during mail API operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// No credential, or an empty one, was supplied.
    #[error("not authenticated: an access token is required")]
    Unauthenticated,

    /// The provider answered with a non-2xx status.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Provider error message, or the status reason when absent.
        message: String,
    },

    /// Network or connection error before a response was received.
    #[error("connection error: {0}")]
    Connection(String),

    /// A 2xx response whose body could not be decoded.
    #[error("invalid response: {0}")]
    Decode(String),
}

impl ProviderError {
    /// Returns true if the provider is throttling this client.
    ///
    /// Gmail signals throttling with 429, and with 403 plus a
    /// `rateLimitExceeded`/`userRateLimitExceeded` style message.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            Self::Api { status: 429, .. } => true,
            Self::Api {
                status: 403,
                message,
            } => {
                let message = message.to_lowercase();
                message.contains("rate limit") || message.contains("ratelimit")
            }
            _ => false,
        }
    }

    /// Returns true if retrying cannot succeed without new credentials.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unauthenticated | Self::Api { status: 401, .. })
    }
}

/// Parameters for one `list` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListRequest {
    /// Provider search query, e.g. `from:example.com`.
    pub query: Option<String>,
    /// Cursor returned by the previous page.
    pub page_token: Option<String>,
    /// Maximum number of IDs to return.
    pub page_size: u32,
}

impl ListRequest {
    /// Creates a request for the first page.
    pub fn new(page_size: u32) -> Self {
        Self {
            query: None,
            page_token: None,
            page_size,
        }
    }

    /// Sets the search query.
    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Continues from the given cursor.
    pub fn page_token(mut self, token: Option<String>) -> Self {
        self.page_token = token;
        self
    }
}

/// One page of message IDs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagePage {
    /// Message IDs in provider order (most recent first).
    pub message_ids: Vec<MessageId>,
    /// Cursor for the next page; `None` when exhausted.
    pub next_page_token: Option<String>,
}

/// Label changes for a batch modify call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelModification {
    /// Labels to add.
    pub add_label_ids: Vec<String>,
    /// Labels to remove.
    pub remove_label_ids: Vec<String>,
}

/// Trait for mailbox API implementations.
///
/// Every method takes the session credential explicitly. An empty
/// credential fails with [`ProviderError::Unauthenticated`] before any
/// request is made.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MailApi: Send + Sync {
    /// Lists one page of message IDs matching the request.
    async fn list_messages(
        &self,
        credential: &Credential,
        request: &ListRequest,
    ) -> Result<MessagePage>;

    /// Fetches the named headers of one message.
    async fn get_message_metadata(
        &self,
        credential: &Credential,
        id: &MessageId,
        header_names: &[String],
    ) -> Result<MessageMetadata>;

    /// Moves one message to the trash.
    async fn trash_message(&self, credential: &Credential, id: &MessageId) -> Result<()>;

    /// Adds and removes labels on many messages at once.
    async fn batch_modify(
        &self,
        credential: &Credential,
        ids: &[MessageId],
        modification: &LabelModification,
    ) -> Result<()>;

    /// Creates a provider-side filter.
    async fn create_filter(&self, credential: &Credential, filter: &SenderFilter) -> Result<()>;

    /// Lists the provider-side filters of the mailbox.
    async fn list_filters(&self, credential: &Credential) -> Result<Vec<SenderFilter>>;
}
