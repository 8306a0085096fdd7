//! Settings and configuration types.
//!
//! Settings are read from `settings.json` in the user's config directory
//! (or XDG equivalent), or from an explicit path. Every field has a
//! default, so a missing file or a partial file is fine. The access token
//! is never part of settings.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use url::Url;

/// Public Gmail API base for the authenticated user.
pub const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

/// Largest page the Gmail list endpoint accepts.
pub const MAX_PAGE_SIZE: u32 = 500;

/// Top-level settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Mail API transport settings.
    pub api: ApiSettings,
    /// Mailbox scan pacing and paging.
    pub scan: ScanSettings,
    /// Bulk deletion and filter settings.
    pub remediation: RemediationSettings,
}

impl Settings {
    /// Returns the default settings file location, if a home directory exists.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "mailsweep").map(|dirs| dirs.config_dir().join("settings.json"))
    }

    /// Loads settings from `path`, falling back to defaults if it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No settings file, using defaults");
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading settings from {}", path.display()))?;
        let settings: Self = serde_json::from_str(&raw)
            .with_context(|| format!("parsing settings in {}", path.display()))?;

        settings.api.base_url().context("invalid api.base_url")?;
        Ok(settings)
    }

    /// Loads settings from the default location, or defaults.
    pub fn load_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }
}

/// Mail API transport settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    /// Base URL of the `users/me` resource.
    pub base_url: String,
    /// Per-request timeout; `None` keeps the transport default.
    pub request_timeout: Option<Duration>,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: GMAIL_API_BASE.to_string(),
            request_timeout: None,
        }
    }
}

impl ApiSettings {
    /// Parses the configured base URL.
    pub fn base_url(&self) -> std::result::Result<Url, url::ParseError> {
        Url::parse(&self.base_url)
    }

    /// Parsed form of [`GMAIL_API_BASE`].
    pub fn default_base_url() -> Url {
        Url::parse(GMAIL_API_BASE).expect("GMAIL_API_BASE is a valid URL")
    }
}

/// Mailbox scan settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    /// Message IDs requested per list page.
    pub page_size: u32,
    /// Metadata fetches issued together.
    pub sub_batch_size: usize,
    /// Pause after each sub-batch.
    pub sub_batch_delay: Duration,
    /// Pause after each page.
    pub page_delay: Duration,
    /// Pause before retrying a throttled page.
    pub rate_limit_backoff: Duration,
    /// Throttled attempts per page before the scan fails.
    pub max_rate_limit_retries: u32,
    /// Optional search query restricting the scan.
    pub query: Option<String>,
    /// Headers requested for every message.
    pub metadata_headers: Vec<String>,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            page_size: 100,
            sub_batch_size: 10,
            sub_batch_delay: Duration::from_millis(300),
            page_delay: Duration::from_millis(500),
            rate_limit_backoff: Duration::from_secs(30),
            max_rate_limit_retries: 5,
            query: None,
            metadata_headers: vec!["From".into(), "Date".into(), "Subject".into()],
        }
    }
}

impl ScanSettings {
    /// Page size clamped to what the provider accepts.
    pub fn effective_page_size(&self) -> u32 {
        self.page_size.clamp(1, MAX_PAGE_SIZE)
    }

    /// Sub-batch size, never zero.
    pub fn effective_sub_batch_size(&self) -> usize {
        self.sub_batch_size.max(1)
    }
}

/// When a deleted domain is dropped from the sender aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalPolicy {
    /// Remove only domains whose messages were all trashed.
    #[default]
    OnlyWhenFullyTrashed,
    /// Remove every targeted domain once the deletion finishes.
    Always,
}

/// Bulk deletion and filter settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemediationSettings {
    /// Page size when collecting a sender's message IDs.
    pub list_page_size: u32,
    /// Trash calls issued together.
    pub trash_chunk_size: usize,
    /// Pause after each trash chunk.
    pub trash_chunk_delay: Duration,
    /// Aggregate removal policy after a deletion.
    pub removal_policy: RemovalPolicy,
    /// Restart the scan from scratch after a deletion flow ends.
    pub rescan_after_mutation: bool,
}

impl Default for RemediationSettings {
    fn default() -> Self {
        Self {
            list_page_size: 100,
            trash_chunk_size: 10,
            trash_chunk_delay: Duration::from_millis(500),
            removal_policy: RemovalPolicy::default(),
            rescan_after_mutation: true,
        }
    }
}

impl RemediationSettings {
    pub fn effective_list_page_size(&self) -> u32 {
        self.list_page_size.clamp(1, MAX_PAGE_SIZE)
    }

    pub fn effective_trash_chunk_size(&self) -> usize {
        self.trash_chunk_size.max(1)
    }
}
