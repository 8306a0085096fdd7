//! Business services layer.
//!
//! This module contains the services that do the actual work: scanning the
//! mailbox into a sender aggregate and remediating senders in bulk.
//!
//! # Architecture
//!
//! Services sit between the handler and the mail API:
//!
//! ```text
//! Application Layer (SweepHandler)
//!          |
//!          v
//!    Services Layer  <-- You are here
//!          |
//!          v
//! Infrastructure (MailApi)
//! ```
//!
//! # Services Overview
//!
//! - [`ScanService`]: Pages through the mailbox and folds senders into the [`SenderStore`]
//! - [`RemediationService`]: Counts, trashes and filters mail from chosen senders
//! - [`StatusReporter`]: Publishes progress and status to observers
//! - [`CancelFlag`]: Cooperative cancellation shared by the scanner and deletions

mod aggregate;
mod cancel;
mod error;
mod remediation;
mod scanner;
mod status;

pub use aggregate::{SenderCount, SenderPage, SenderStore};
pub use cancel::CancelFlag;
pub use error::{SweepError, SweepResult};
pub use remediation::{
    DeletionKind, DeletionReport, FilterOutcome, PendingDeletion, RemediationService, TrashSummary,
};
pub use scanner::{FetchOutcome, ScanCursor, ScanOutcome, ScanReport, ScanService, SubBatchResult};
pub use status::{
    DeletionPhase, ScanPhase, ScanProgress, ScanTrigger, StatusReporter, SweepEvent, SweepStatus,
};
