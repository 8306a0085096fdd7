//! Mail API client implementations.
//!
//! This module contains the [`MailApi`] trait and its Gmail REST
//! implementation, [`GmailClient`].
//!
//! # Architecture
//!
//! The core never talks HTTP directly. The scanner and the remediation
//! engine depend on [`MailApi`] only, so tests run against in-memory
//! mailboxes and the transport stays swappable.
//!
//! # Example
//!
//! ```ignore
//! use mailsweep::domain::Credential;
//! use mailsweep::providers::email::{ListRequest, MailApi};
//!
//! async fn first_page(api: &dyn MailApi, credential: &Credential) {
//!     let page = api
//!         .list_messages(credential, &ListRequest::new(100))
//!         .await
//!         .expect("failed to list messages");
//!
//!     for id in page.message_ids {
//!         println!("{}", id);
//!     }
//! }
//! ```

mod gmail;
mod traits;

#[cfg(test)]
pub(crate) mod fake;

pub use gmail::GmailClient;
pub use traits::{
    LabelModification, ListRequest, MailApi, MessagePage, ProviderError, Result,
};

#[cfg(test)]
pub use traits::MockMailApi;
