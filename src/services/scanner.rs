//! Paginated mailbox scanner.
//!
//! The [`ScanService`] walks the mailbox page by page, fetches the `From`
//! header of every message in small concurrent sub-batches, and folds the
//! normalized sender domains into the shared [`SenderStore`].
//!
//! # Checkpoints
//!
//! Cancellation is observed at the top of each page and before each
//! sub-batch, never inside one. A page's counts are merged once the page
//! is done; on cancellation the sub-batches that already completed are
//! merged too, so partial results stay visible.
//!
//! # Throttling
//!
//! Sub-batches and pages are separated by pacing delays. If the provider
//! throttles a list call or any metadata fetch, the page's partial counts
//! are discarded and the same page is retried after an extended backoff.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;

use super::{
    CancelFlag, ScanPhase, ScanProgress, ScanTrigger, SenderStore, StatusReporter, SweepEvent,
};
use crate::config::ScanSettings;
use crate::domain::{Credential, MessageId, SenderDomain};
use crate::providers::email::{ListRequest, MailApi, MessagePage, ProviderError};

/// Pagination state of a scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanCursor {
    /// Token for the next page; `None` before the first page and once exhausted.
    pub page_token: Option<String>,
    /// Messages processed so far.
    pub processed: usize,
}

/// Result of fetching one message's metadata.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// The message was attributed to a sender.
    Counted(SenderDomain),
    /// The message had no `From` header.
    Skipped(MessageId),
    /// The fetch failed.
    Failed(MessageId, ProviderError),
}

/// Aggregated outcomes of one sub-batch, in input order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubBatchResult {
    pub counted: Vec<SenderDomain>,
    pub skipped: Vec<MessageId>,
    pub failed: Vec<(MessageId, ProviderError)>,
}

impl SubBatchResult {
    /// First fatal failure, if any.
    pub fn fatal(&self) -> Option<&ProviderError> {
        self.failed.iter().map(|(_, e)| e).find(|e| e.is_fatal())
    }

    /// First throttling failure, if any.
    pub fn rate_limited(&self) -> Option<&ProviderError> {
        self.failed.iter().map(|(_, e)| e).find(|e| e.is_rate_limited())
    }
}

impl FromIterator<FetchOutcome> for SubBatchResult {
    fn from_iter<I: IntoIterator<Item = FetchOutcome>>(iter: I) -> Self {
        let mut result = Self::default();
        for outcome in iter {
            match outcome {
                FetchOutcome::Counted(domain) => result.counted.push(domain),
                FetchOutcome::Skipped(id) => result.skipped.push(id),
                FetchOutcome::Failed(id, err) => result.failed.push((id, err)),
            }
        }
        result
    }
}

/// How a scan ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome {
    Completed,
    Cancelled,
    Failed(ProviderError),
}

impl ScanOutcome {
    pub fn phase(&self) -> ScanPhase {
        match self {
            Self::Completed => ScanPhase::Completed,
            Self::Cancelled => ScanPhase::Cancelled,
            Self::Failed(_) => ScanPhase::Failed,
        }
    }
}

/// Summary of a finished scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanReport {
    pub trigger: ScanTrigger,
    pub outcome: ScanOutcome,
    /// Pages fully merged into the aggregate.
    pub pages: usize,
    /// Messages processed, including failed and skipped ones.
    pub processed: usize,
    /// Distinct senders in the aggregate when the scan ended.
    pub senders: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// How one page ended.
enum PageResult {
    Done(Vec<SenderDomain>),
    Cancelled {
        counted: Vec<SenderDomain>,
        processed: usize,
    },
    RateLimited(ProviderError),
    Fatal(ProviderError),
}

/// Mailbox scanner.
///
/// One scan runs at a time per store; the caller (the handler) guarantees
/// that by owning the single scan task.
pub struct ScanService {
    api: Arc<dyn MailApi>,
    store: Arc<SenderStore>,
    reporter: Arc<StatusReporter>,
    settings: ScanSettings,
}

impl ScanService {
    pub fn new(
        api: Arc<dyn MailApi>,
        store: Arc<SenderStore>,
        reporter: Arc<StatusReporter>,
        settings: ScanSettings,
    ) -> Self {
        Self {
            api,
            store,
            reporter,
            settings,
        }
    }

    pub fn settings(&self) -> &ScanSettings {
        &self.settings
    }

    /// Runs a full scan from an empty aggregate until exhausted, cancelled or failed.
    pub async fn run(
        &self,
        credential: &Credential,
        cancel: &CancelFlag,
        trigger: ScanTrigger,
    ) -> ScanReport {
        let started_at = Utc::now();
        self.store.clear();

        tracing::info!(?trigger, page_size = self.settings.effective_page_size(), "Scan started");
        self.reporter.publish(SweepEvent::ScanStarted(trigger));
        self.reporter.status("Starting analysis...");
        self.publish_progress(ScanPhase::Running, 0);

        let mut cursor = ScanCursor::default();
        let mut pages = 0;
        let outcome = self
            .scan_pages(credential, cancel, &mut cursor, &mut pages)
            .await;

        let processed = cursor.processed;
        self.publish_progress(outcome.phase(), processed);
        match &outcome {
            ScanOutcome::Completed => {
                tracing::info!(processed, senders = self.store.len(), "Scan completed");
                self.reporter.status(format!(
                    "Analysis complete. Scanned a total of {} emails.",
                    processed
                ));
            }
            ScanOutcome::Cancelled => {
                tracing::info!(processed, "Scan cancelled");
                self.reporter.status(format!(
                    "Scanning stopped after {} emails. Results so far are kept.",
                    processed
                ));
            }
            ScanOutcome::Failed(err) => {
                tracing::error!(processed, error = %err, "Scan failed");
                let message = format!(
                    "Analysis failed after {} emails: {}. Retry to scan again from the start.",
                    processed, err
                );
                self.reporter.status(message.clone());
                self.reporter.error(message);
            }
        }

        ScanReport {
            trigger,
            outcome,
            pages,
            processed,
            senders: self.store.len(),
            started_at,
            finished_at: Utc::now(),
        }
    }

    async fn scan_pages(
        &self,
        credential: &Credential,
        cancel: &CancelFlag,
        cursor: &mut ScanCursor,
        pages: &mut usize,
    ) -> ScanOutcome {
        let mut throttled = 0;

        loop {
            if cancel.is_cancelled() {
                return ScanOutcome::Cancelled;
            }

            let request = ListRequest {
                query: self.settings.query.clone(),
                page_token: cursor.page_token.clone(),
                page_size: self.settings.effective_page_size(),
            };

            let page: MessagePage = match self.api.list_messages(credential, &request).await {
                Ok(page) => page,
                Err(err) if err.is_rate_limited() => {
                    match self.back_off(cancel, &mut throttled, err).await {
                        Some(outcome) => return outcome,
                        None => continue,
                    }
                }
                Err(err) => return ScanOutcome::Failed(err),
            };

            if page.message_ids.is_empty() {
                return ScanOutcome::Completed;
            }

            match self.process_page(credential, &page.message_ids, cancel).await {
                PageResult::Done(counted) => {
                    self.merge(counted);
                    cursor.processed += page.message_ids.len();
                    *pages += 1;
                    throttled = 0;
                }
                PageResult::Cancelled { counted, processed } => {
                    self.merge(counted);
                    cursor.processed += processed;
                    return ScanOutcome::Cancelled;
                }
                PageResult::RateLimited(err) => {
                    match self.back_off(cancel, &mut throttled, err).await {
                        Some(outcome) => return outcome,
                        None => continue,
                    }
                }
                PageResult::Fatal(err) => return ScanOutcome::Failed(err),
            }

            self.publish_progress(ScanPhase::Running, cursor.processed);
            self.reporter.status(format!(
                "Scanned {} emails, found {} senders...",
                cursor.processed,
                self.store.len()
            ));
            tracing::debug!(page = *pages, processed = cursor.processed, "Page merged");

            cursor.page_token = page.next_page_token;
            if cursor.page_token.is_none() {
                return ScanOutcome::Completed;
            }

            cancel.sleep(self.settings.page_delay).await;
        }
    }

    /// Sleeps before retrying a throttled page.
    ///
    /// Returns the terminal outcome if retries are exhausted or the wait
    /// was cancelled, `None` to retry.
    async fn back_off(
        &self,
        cancel: &CancelFlag,
        throttled: &mut u32,
        err: ProviderError,
    ) -> Option<ScanOutcome> {
        *throttled += 1;
        if *throttled > self.settings.max_rate_limit_retries {
            return Some(ScanOutcome::Failed(err));
        }

        let backoff = self.settings.rate_limit_backoff;
        tracing::warn!(attempt = *throttled, ?backoff, error = %err, "Rate limited, backing off");
        self.reporter.status(format!(
            "Rate limited by the mail provider; waiting {}s before retrying...",
            backoff.as_secs()
        ));

        if cancel.sleep(backoff).await {
            None
        } else {
            Some(ScanOutcome::Cancelled)
        }
    }

    async fn process_page(
        &self,
        credential: &Credential,
        ids: &[MessageId],
        cancel: &CancelFlag,
    ) -> PageResult {
        let mut counted = Vec::with_capacity(ids.len());
        let mut processed = 0;

        for chunk in ids.chunks(self.settings.effective_sub_batch_size()) {
            if cancel.is_cancelled() {
                return PageResult::Cancelled { counted, processed };
            }

            let result = self.fetch_sub_batch(credential, chunk).await;

            if let Some(err) = result.fatal() {
                return PageResult::Fatal(err.clone());
            }
            if let Some(err) = result.rate_limited() {
                return PageResult::RateLimited(err.clone());
            }

            for id in &result.skipped {
                tracing::debug!(message_id = %id, "Message has no From header, skipped");
            }
            for (id, err) in &result.failed {
                tracing::warn!(message_id = %id, error = %err, "Metadata fetch failed, skipped");
            }

            counted.extend(result.counted);
            processed += chunk.len();

            cancel.sleep(self.settings.sub_batch_delay).await;
        }

        PageResult::Done(counted)
    }

    /// Fetches one sub-batch concurrently and collects outcomes in input order.
    async fn fetch_sub_batch(&self, credential: &Credential, ids: &[MessageId]) -> SubBatchResult {
        let headers = &self.settings.metadata_headers;
        let fetches = ids.iter().map(|id| async move {
            match self.api.get_message_metadata(credential, id, headers).await {
                Ok(meta) => match meta.sender_domain() {
                    Some(domain) => FetchOutcome::Counted(domain),
                    None => FetchOutcome::Skipped(id.clone()),
                },
                Err(err) => FetchOutcome::Failed(id.clone(), err),
            }
        });

        join_all(fetches).await.into_iter().collect()
    }

    fn merge(&self, counted: Vec<SenderDomain>) {
        self.store.upsert_many(counted.into_iter().map(|d| (d, 1)));
    }

    fn publish_progress(&self, phase: ScanPhase, processed: usize) {
        self.reporter.publish(SweepEvent::Scan(ScanProgress {
            phase,
            processed,
            senders: self.store.len(),
        }));
    }
}
