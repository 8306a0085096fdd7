//! Configuration and settings management.
//!
//! This module provides settings types and loading. Settings are stored in
//! the user's config directory as JSON.

mod settings;

pub use settings::{
    ApiSettings, RemediationSettings, RemovalPolicy, ScanSettings, Settings, GMAIL_API_BASE,
    MAX_PAGE_SIZE,
};
