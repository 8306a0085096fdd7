//! Server-side filter domain types.
//!
//! A sender filter is how "unsubscribe" is expressed: future mail from a
//! domain skips the inbox and lands in the trash.

use serde::{Deserialize, Serialize};

use super::SenderDomain;

/// Well-known system label IDs.
pub mod system_labels {
    pub const INBOX: &str = "INBOX";
    pub const TRASH: &str = "TRASH";
}

/// Matching criteria of a provider filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterCriteria {
    /// Sender address or domain to match.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

/// Label changes a provider filter applies to matching mail.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterAction {
    /// Labels to add.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub add_label_ids: Vec<String>,
    /// Labels to remove.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remove_label_ids: Vec<String>,
}

/// A provider-side filter: criteria plus action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderFilter {
    #[serde(default)]
    pub criteria: FilterCriteria,
    #[serde(default)]
    pub action: FilterAction,
}

impl SenderFilter {
    /// Builds the auto-trash filter for a sender domain.
    pub fn trash_from(domain: &SenderDomain) -> Self {
        Self {
            criteria: FilterCriteria {
                from: Some(domain.0.clone()),
            },
            action: FilterAction {
                add_label_ids: vec![system_labels::TRASH.to_string()],
                remove_label_ids: vec![system_labels::INBOX.to_string()],
            },
        }
    }

    /// Returns the domain this filter auto-trashes, if it is such a filter.
    pub fn trashed_domain(&self) -> Option<SenderDomain> {
        let trashes = self
            .action
            .add_label_ids
            .iter()
            .any(|l| l == system_labels::TRASH);
        if !trashes {
            return None;
        }
        self.criteria
            .from
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(|f| SenderDomain(f.to_lowercase()))
    }
}
