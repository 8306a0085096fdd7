//! Batch remediation engine.
//!
//! Deletions are two-phase. [`RemediationService::count`] enumerates every
//! message ID of the requested senders and freezes them into a
//! [`PendingDeletion`]; [`RemediationService::execute`] trashes that frozen
//! list in paced chunks and then removes the purged senders from the
//! aggregate. Filters ("unsubscribe") are created through the same service
//! and deduplicated against the set of senders already filtered.
//!
//! Pausing and resuming the scanner around a deletion is the caller's job;
//! this service assumes no scan is mutating the aggregate while it runs.

use std::collections::HashSet;
use std::ops::Range;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{DeletionPhase, SenderStore, StatusReporter, SweepError, SweepEvent, SweepResult};
use crate::config::{RemediationSettings, RemovalPolicy};
use crate::domain::{normalize_domain, Credential, MessageId, SenderDomain, SenderFilter};
use crate::providers::email::{self, ListRequest, MailApi};

/// Whether a deletion targets one sender or a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionKind {
    Single,
    Bulk,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct DomainTarget {
    domain: SenderDomain,
    /// Slice of the frozen ID list holding this domain's messages.
    ids: Range<usize>,
}

/// A deletion awaiting confirmation.
///
/// The message ID list is frozen when counting completes; nothing changes
/// it afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDeletion {
    pub id: Uuid,
    pub kind: DeletionKind,
    pub phase: DeletionPhase,
    pub created_at: DateTime<Utc>,
    targets: Vec<DomainTarget>,
    message_ids: Arc<[MessageId]>,
}

impl PendingDeletion {
    /// Domains in the order they were counted.
    pub fn domains(&self) -> Vec<SenderDomain> {
        self.targets.iter().map(|t| t.domain.clone()).collect()
    }

    pub fn message_ids(&self) -> &[MessageId] {
        &self.message_ids
    }

    /// Total number of messages to trash.
    pub fn count(&self) -> usize {
        self.message_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.message_ids.is_empty()
    }

    /// Number of messages counted for one domain.
    pub fn count_for(&self, domain: &SenderDomain) -> usize {
        self.targets
            .iter()
            .find(|t| &t.domain == domain)
            .map_or(0, |t| t.ids.len())
    }
}

/// Outcome of a chunked trash run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrashSummary {
    pub attempted: usize,
    pub succeeded: usize,
    /// IDs whose trash call failed, in input order.
    pub failed: Vec<MessageId>,
}

impl TrashSummary {
    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    /// True if every attempted message was trashed.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Human-readable result line.
    pub fn message(&self) -> String {
        if self.is_complete() {
            format!("Successfully deleted {} emails.", self.succeeded)
        } else {
            format!(
                "Trashed {} of {} emails; {} failed.",
                self.succeeded,
                self.attempted,
                self.failed_count()
            )
        }
    }
}

/// Result of a confirmed deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionReport {
    pub id: Uuid,
    pub kind: DeletionKind,
    pub summary: TrashSummary,
    /// Domains removed from the aggregate.
    pub removed: Vec<SenderDomain>,
    /// Domains kept because some of their messages failed to trash.
    pub retained: Vec<SenderDomain>,
    pub message: String,
}

/// Result of a filter request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOutcome {
    Created,
    AlreadyFiltered,
}

#[derive(Debug, Default)]
struct FilterSet {
    domains: HashSet<SenderDomain>,
    loaded: bool,
}

/// Trash and filter operations over sender domains.
pub struct RemediationService {
    api: Arc<dyn MailApi>,
    store: Arc<SenderStore>,
    reporter: Arc<StatusReporter>,
    settings: RemediationSettings,
    filters: Mutex<FilterSet>,
}

impl RemediationService {
    pub fn new(
        api: Arc<dyn MailApi>,
        store: Arc<SenderStore>,
        reporter: Arc<StatusReporter>,
        settings: RemediationSettings,
    ) -> Self {
        Self {
            api,
            store,
            reporter,
            settings,
            filters: Mutex::new(FilterSet::default()),
        }
    }

    pub fn settings(&self) -> &RemediationSettings {
        &self.settings
    }

    fn filters(&self) -> MutexGuard<'_, FilterSet> {
        self.filters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lists every message ID from `domain`, following the cursor to the end.
    pub async fn collect_message_ids(
        &self,
        credential: &Credential,
        domain: &SenderDomain,
    ) -> email::Result<Vec<MessageId>> {
        let mut ids = Vec::new();
        let mut page_token = None;

        loop {
            let request = ListRequest::new(self.settings.effective_list_page_size())
                .query(format!("from:{}", domain))
                .page_token(page_token);
            let page = self.api.list_messages(credential, &request).await?;
            ids.extend(page.message_ids);

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        tracing::debug!(domain = %domain, count = ids.len(), "Collected message IDs");
        Ok(ids)
    }

    /// Counts the messages of each domain, in order, and freezes the result.
    ///
    /// Any listing failure aborts the whole count; nothing is mutated.
    pub async fn count(
        &self,
        credential: &Credential,
        kind: DeletionKind,
        domains: &[SenderDomain],
    ) -> SweepResult<PendingDeletion> {
        self.reporter.publish(SweepEvent::Deletion {
            phase: DeletionPhase::Counting,
            domains: domains.to_vec(),
        });

        let mut targets = Vec::with_capacity(domains.len());
        let mut message_ids = Vec::new();

        for domain in domains {
            self.reporter
                .status(format!("Counting emails from {}...", domain));

            let ids = self
                .collect_message_ids(credential, domain)
                .await
                .map_err(|source| {
                    tracing::error!(domain = %domain, error = %source, "Counting failed");
                    SweepError::Listing {
                        domain: domain.clone(),
                        source,
                    }
                })?;

            let start = message_ids.len();
            message_ids.extend(ids);
            targets.push(DomainTarget {
                domain: domain.clone(),
                ids: start..message_ids.len(),
            });
        }

        let pending = PendingDeletion {
            id: Uuid::new_v4(),
            kind,
            phase: DeletionPhase::Confirming,
            created_at: Utc::now(),
            targets,
            message_ids: message_ids.into(),
        };

        tracing::info!(
            deletion_id = %pending.id,
            ?kind,
            domains = domains.len(),
            count = pending.count(),
            "Deletion counted"
        );

        if !pending.is_empty() {
            self.reporter.publish(SweepEvent::Deletion {
                phase: DeletionPhase::Confirming,
                domains: domains.to_vec(),
            });
            self.reporter.status(format!(
                "Found {} emails from {}. Confirm to move them to the trash.",
                pending.count(),
                describe(domains)
            ));
        }

        Ok(pending)
    }

    /// Trashes `ids` in paced chunks, tallying failures.
    pub async fn trash_messages(&self, credential: &Credential, ids: &[MessageId]) -> TrashSummary {
        let total = ids.len();
        let mut summary = TrashSummary {
            attempted: total,
            ..Default::default()
        };

        let mut chunks = ids
            .chunks(self.settings.effective_trash_chunk_size())
            .peekable();
        while let Some(chunk) = chunks.next() {
            let results = join_all(
                chunk
                    .iter()
                    .map(|id| async move { (id, self.api.trash_message(credential, id).await) }),
            )
            .await;

            for (id, result) in results {
                match result {
                    Ok(()) => summary.succeeded += 1,
                    Err(err) => {
                        tracing::warn!(message_id = %id, error = %err, "Trash failed");
                        summary.failed.push(id.clone());
                    }
                }
            }

            self.reporter.publish(SweepEvent::TrashProgress {
                succeeded: summary.succeeded,
                failed: summary.failed_count(),
                total,
            });
            let mut line = format!("Trashed {} of {} emails...", summary.succeeded, total);
            if !summary.is_complete() {
                line.push_str(&format!(" ({} failed)", summary.failed_count()));
            }
            self.reporter.status(line);

            if chunks.peek().is_some() && !self.settings.trash_chunk_delay.is_zero() {
                tokio::time::sleep(self.settings.trash_chunk_delay).await;
            }
        }

        summary
    }

    /// Trashes a confirmed deletion's frozen IDs and updates the aggregate.
    pub async fn execute(
        &self,
        credential: &Credential,
        pending: &PendingDeletion,
    ) -> DeletionReport {
        let domains = pending.domains();
        self.reporter.publish(SweepEvent::Deletion {
            phase: DeletionPhase::Deleting,
            domains: domains.clone(),
        });
        tracing::info!(deletion_id = %pending.id, count = pending.count(), "Deletion started");

        let summary = self.trash_messages(credential, pending.message_ids()).await;
        let failed: HashSet<&MessageId> = summary.failed.iter().collect();

        let mut removed = Vec::new();
        let mut retained = Vec::new();
        for target in &pending.targets {
            let fully_trashed = pending.message_ids[target.ids.clone()]
                .iter()
                .all(|id| !failed.contains(id));

            if fully_trashed || self.settings.removal_policy == RemovalPolicy::Always {
                self.store.remove(&target.domain);
                removed.push(target.domain.clone());
            } else {
                retained.push(target.domain.clone());
            }
        }

        let message = summary.message();
        tracing::info!(
            deletion_id = %pending.id,
            succeeded = summary.succeeded,
            failed = summary.failed_count(),
            removed = removed.len(),
            "Deletion finished"
        );
        self.reporter.status(message.clone());

        DeletionReport {
            id: pending.id,
            kind: pending.kind,
            summary,
            removed,
            retained,
            message,
        }
    }

    /// Loads the provider's existing trash filters once per session.
    ///
    /// A failure is logged and retried on the next call.
    pub async fn ensure_filters_loaded(&self, credential: &Credential) {
        if self.filters().loaded {
            return;
        }

        match self.api.list_filters(credential).await {
            Ok(filters) => {
                let mut set = self.filters();
                set.domains.extend(filters.iter().filter_map(filtered_domain));
                set.loaded = true;
                tracing::debug!(count = set.domains.len(), "Existing filters loaded");
            }
            Err(err) => {
                tracing::warn!(error = %err, "Could not load existing filters");
            }
        }
    }

    /// Returns true if future mail from `domain` is already auto-trashed.
    pub fn is_filtered(&self, domain: &SenderDomain) -> bool {
        self.filters().domains.contains(domain)
    }

    /// Creates an auto-trash filter for `domain` unless one already exists.
    pub async fn create_filter(
        &self,
        credential: &Credential,
        domain: &SenderDomain,
    ) -> SweepResult<FilterOutcome> {
        self.ensure_filters_loaded(credential).await;

        if self.is_filtered(domain) {
            self.reporter
                .status(format!("Emails from {} are already filtered.", domain));
            return Ok(FilterOutcome::AlreadyFiltered);
        }

        self.api
            .create_filter(credential, &SenderFilter::trash_from(domain))
            .await
            .map_err(|source| {
                tracing::error!(domain = %domain, error = %source, "Filter creation failed");
                SweepError::Filter {
                    domain: domain.clone(),
                    source,
                }
            })?;

        self.filters().domains.insert(domain.clone());
        tracing::info!(domain = %domain, "Filter created");
        self.reporter.status(format!(
            "Unsubscribed from {}: future emails will go to the trash.",
            domain
        ));
        Ok(FilterOutcome::Created)
    }

    /// Trashes one message, reporting it by subject when available.
    pub async fn trash_single(&self, credential: &Credential, id: &MessageId) -> SweepResult<()> {
        let subject = match self
            .api
            .get_message_metadata(credential, id, &[crate::domain::headers::SUBJECT.to_string()])
            .await
        {
            Ok(meta) => meta.subject().map(str::to_owned),
            Err(err) => {
                tracing::debug!(message_id = %id, error = %err, "Subject lookup failed");
                None
            }
        };
        let label = subject.map_or_else(|| id.to_string(), |s| format!("\"{}\"", s));

        match self.api.trash_message(credential, id).await {
            Ok(()) => {
                self.reporter.status(format!("Trashed email {}.", label));
                Ok(())
            }
            Err(source) => {
                let err = SweepError::Trash {
                    id: id.clone(),
                    source,
                };
                self.reporter.status(format!("Could not trash email {}.", label));
                self.reporter.error(err.to_string());
                Err(err)
            }
        }
    }
}

/// Domain auto-trashed by a provider filter, normalized like scanned senders.
fn filtered_domain(filter: &SenderFilter) -> Option<SenderDomain> {
    let raw = filter.trashed_domain()?;
    if raw.as_str().contains('@') {
        Some(normalize_domain(Some(raw.as_str())))
    } else {
        Some(raw)
    }
}

fn describe(domains: &[SenderDomain]) -> String {
    match domains {
        [one] => one.to_string(),
        many => format!("{} senders", many.len()),
    }
}
