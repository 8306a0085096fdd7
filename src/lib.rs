//! mailsweep - Sender analysis and bulk cleanup for a mailbox
//!
//! This crate scans a mailbox through a rate-limited, paginated mail API,
//! groups messages by normalized sender domain, and offers bulk remediation:
//! trashing everything from a sender, deleting across selected senders,
//! and creating provider-side filters that auto-trash future mail.

pub mod app;
pub mod config;
pub mod domain;
pub mod providers;
pub mod services;

pub use app::SweepHandler;
