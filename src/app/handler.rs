//! Handler surface consumed by the presentation layer.
//!
//! [`SweepHandler`] owns one session: the credential, the sender aggregate,
//! the scan task and the deletion flow. It enforces that at most one of
//! them mutates the aggregate at a time. Every deletion flow halts the
//! scanner first (cancel, then await the task) and, once the flow
//! resolves either way, restarts a full scan with
//! [`ScanTrigger::AfterDeletion`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::SessionState;
use crate::config::Settings;
use crate::domain::{Credential, MessageId, SenderDomain};
use crate::providers::email::MailApi;
use crate::services::{
    CancelFlag, DeletionKind, DeletionPhase, DeletionReport, FilterOutcome, PendingDeletion,
    RemediationService, ScanReport, ScanService, ScanTrigger, SenderCount, SenderPage,
    SenderStore, StatusReporter, SweepError, SweepEvent, SweepResult, SweepStatus,
};

/// What a deletion request resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeletionPrompt {
    /// The senders have no messages; the flow already ended.
    NothingToDelete { domains: Vec<SenderDomain> },
    /// Messages were counted and await confirmation.
    Confirm {
        id: Uuid,
        domains: Vec<SenderDomain>,
        count: usize,
    },
}

impl DeletionPrompt {
    fn from_pending(pending: &PendingDeletion) -> Self {
        if pending.is_empty() {
            Self::NothingToDelete {
                domains: pending.domains(),
            }
        } else {
            Self::Confirm {
                id: pending.id,
                domains: pending.domains(),
                count: pending.count(),
            }
        }
    }

    pub fn needs_confirmation(&self) -> bool {
        matches!(self, Self::Confirm { .. })
    }
}

/// Result of a full unsubscribe: the filter, then the backlog deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsubscribeOutcome {
    pub filter: FilterOutcome,
    pub deletion: DeletionPrompt,
}

/// One mailbox session.
pub struct SweepHandler {
    credential: Option<Credential>,
    store: Arc<SenderStore>,
    reporter: Arc<StatusReporter>,
    scanner: Arc<ScanService>,
    remediation: RemediationService,
    cancel: CancelFlag,
    scan_task: tokio::sync::Mutex<Option<JoinHandle<ScanReport>>>,
    state: Arc<Mutex<SessionState>>,
    rescan_after_mutation: bool,
}

impl SweepHandler {
    /// Creates a session. A missing or empty credential allows no analysis.
    pub fn new(api: Arc<dyn MailApi>, credential: Option<Credential>, settings: Settings) -> Self {
        let store = Arc::new(SenderStore::new());
        let reporter = Arc::new(StatusReporter::new());
        let scanner = Arc::new(ScanService::new(
            api.clone(),
            store.clone(),
            reporter.clone(),
            settings.scan,
        ));
        let rescan_after_mutation = settings.remediation.rescan_after_mutation;
        let remediation =
            RemediationService::new(api, store.clone(), reporter.clone(), settings.remediation);

        Self {
            credential: credential.filter(|c| !c.is_empty()),
            store,
            reporter,
            scanner,
            remediation,
            cancel: CancelFlag::new(),
            scan_task: tokio::sync::Mutex::new(None),
            state: Arc::new(Mutex::new(SessionState::new())),
            rescan_after_mutation,
        }
    }

    fn credential(&self) -> SweepResult<&Credential> {
        self.credential.as_ref().ok_or(SweepError::NotAuthenticated)
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        lock_state(&self.state)
    }

    pub fn is_authenticated(&self) -> bool {
        self.credential.is_some()
    }

    // ---- Scanning ----

    /// (Re)starts the scanner from an empty aggregate.
    pub async fn start_analysis(&self) -> SweepResult<()> {
        let credential = self.credential()?.clone();
        if self.state().is_deletion_active() {
            return Err(SweepError::DeletionInProgress);
        }
        self.restart_scan(credential, ScanTrigger::Requested).await;
        Ok(())
    }

    /// Requests the running scan to stop at its next checkpoint.
    pub fn stop_analysis(&self) {
        tracing::info!("Stop requested");
        self.cancel.cancel();
    }

    /// Waits for the current scan task, if any, and returns its report.
    pub async fn wait_for_scan(&self) -> Option<ScanReport> {
        let handle = self.scan_task.lock().await.take()?;
        join_scan(handle).await
    }

    /// Report of the most recently finished scan.
    pub fn last_scan(&self) -> Option<ScanReport> {
        self.state().last_scan().cloned()
    }

    async fn restart_scan(&self, credential: Credential, trigger: ScanTrigger) {
        let mut task = self.scan_task.lock().await;
        if let Some(handle) = task.take() {
            self.cancel.cancel();
            join_scan(handle).await;
        }
        self.cancel.reset();

        let scanner = self.scanner.clone();
        let cancel = self.cancel.clone();
        let state = self.state.clone();
        *task = Some(tokio::spawn(async move {
            let report = scanner.run(&credential, &cancel, trigger).await;
            lock_state(&state).set_last_scan(report.clone());
            report
        }));
    }

    /// Cancels the running scan and waits until it has stopped.
    async fn halt_scan(&self) {
        let mut task = self.scan_task.lock().await;
        if let Some(handle) = task.take() {
            self.cancel.cancel();
            join_scan(handle).await;
        }
    }

    /// Clears the cancel flag and, if configured, rescans from scratch.
    async fn resume_scan(&self) {
        match (&self.credential, self.rescan_after_mutation) {
            (Some(credential), true) => {
                self.restart_scan(credential.clone(), ScanTrigger::AfterDeletion)
                    .await
            }
            _ => self.cancel.reset(),
        }
    }

    // ---- Aggregate ----

    /// Senders ordered by message count, highest first.
    pub fn aggregate_snapshot(&self) -> Vec<SenderCount> {
        self.store.snapshot()
    }

    /// One 1-based page of the ordered sender list.
    pub fn sender_page(&self, page: usize, per_page: usize) -> SenderPage {
        self.store.page(page, per_page)
    }

    // ---- Selection ----

    pub fn select_sender(&self, domain: SenderDomain) {
        self.state().select_sender(domain);
    }

    pub fn deselect_sender(&self, domain: &SenderDomain) {
        self.state().deselect_sender(domain);
    }

    pub fn toggle_sender(&self, domain: &SenderDomain) {
        self.state().toggle_sender(domain);
    }

    pub fn selected_senders(&self) -> Vec<SenderDomain> {
        self.state().selected_senders()
    }

    // ---- Deletion ----

    /// Counts every message from `domain` and asks for confirmation.
    pub async fn request_domain_deletion(
        &self,
        domain: SenderDomain,
    ) -> SweepResult<DeletionPrompt> {
        self.request_deletion(DeletionKind::Single, vec![domain]).await
    }

    pub async fn confirm_domain_deletion(&self) -> SweepResult<DeletionReport> {
        self.confirm_deletion(DeletionKind::Single).await
    }

    pub async fn cancel_domain_deletion(&self) -> SweepResult<()> {
        self.cancel_deletion(DeletionKind::Single).await
    }

    /// Counts every message from the given senders and asks for confirmation.
    ///
    /// Duplicates are ignored; the first occurrence keeps its position.
    pub async fn request_bulk_deletion<I>(&self, domains: I) -> SweepResult<DeletionPrompt>
    where
        I: IntoIterator<Item = SenderDomain>,
    {
        let mut unique: Vec<SenderDomain> = Vec::new();
        for domain in domains {
            if !unique.contains(&domain) {
                unique.push(domain);
            }
        }
        if unique.is_empty() {
            return Err(SweepError::NoDomainsSelected);
        }
        self.request_deletion(DeletionKind::Bulk, unique).await
    }

    /// Bulk deletion over the current selection.
    pub async fn request_selected_deletion(&self) -> SweepResult<DeletionPrompt> {
        let selected = self.selected_senders();
        self.request_bulk_deletion(selected).await
    }

    /// Trashes the counted messages and clears the selection.
    pub async fn confirm_bulk_deletion(&self) -> SweepResult<DeletionReport> {
        self.confirm_deletion(DeletionKind::Bulk).await
    }

    pub async fn cancel_bulk_deletion(&self) -> SweepResult<()> {
        self.cancel_deletion(DeletionKind::Bulk).await
    }

    /// The deletion awaiting confirmation, if any.
    pub fn pending_deletion(&self) -> Option<PendingDeletion> {
        self.state().pending().cloned()
    }

    async fn request_deletion(
        &self,
        kind: DeletionKind,
        domains: Vec<SenderDomain>,
    ) -> SweepResult<DeletionPrompt> {
        let credential = self.credential()?;
        if !self.state().begin_deletion() {
            return Err(SweepError::DeletionInProgress);
        }

        tracing::info!(?kind, domains = domains.len(), "Deletion requested");
        self.halt_scan().await;

        let pending = match self.remediation.count(credential, kind, &domains).await {
            Ok(pending) => pending,
            Err(err) => {
                self.reporter.status(err.to_string());
                self.reporter.error(err.to_string());
                self.finish_deletion().await;
                return Err(err);
            }
        };

        let prompt = DeletionPrompt::from_pending(&pending);
        if pending.is_empty() {
            self.reporter.status(format!(
                "No emails found from {}. Nothing to delete.",
                join(&domains)
            ));
            self.finish_deletion().await;
        } else {
            self.state().set_pending(pending);
        }
        Ok(prompt)
    }

    async fn confirm_deletion(&self, kind: DeletionKind) -> SweepResult<DeletionReport> {
        let credential = self.credential()?;
        let mut pending = self.take_pending(kind).ok_or(SweepError::NothingPending)?;

        pending.phase = DeletionPhase::Deleting;
        let report = self.remediation.execute(credential, &pending).await;

        if kind == DeletionKind::Bulk {
            self.state().clear_selection();
        }
        self.finish_deletion().await;
        Ok(report)
    }

    async fn cancel_deletion(&self, kind: DeletionKind) -> SweepResult<()> {
        self.take_pending(kind).ok_or(SweepError::NothingPending)?;

        tracing::info!(?kind, "Deletion cancelled");
        self.reporter.status("Deletion cancelled. Nothing was deleted.");
        self.finish_deletion().await;
        Ok(())
    }

    /// Takes the pending deletion of `kind` under a single lock, so only
    /// one of confirm and cancel can claim it.
    fn take_pending(&self, kind: DeletionKind) -> Option<PendingDeletion> {
        let mut state = self.state();
        if state.pending().is_some_and(|p| p.kind == kind) {
            state.take_pending()
        } else {
            None
        }
    }

    async fn finish_deletion(&self) {
        self.state().end_deletion();
        self.reporter.publish(SweepEvent::DeletionFinished);
        self.resume_scan().await;
    }

    // ---- Filters and single messages ----

    /// Creates an auto-trash filter for `domain`; existing mail is kept.
    pub async fn request_unsubscribe(&self, domain: SenderDomain) -> SweepResult<FilterOutcome> {
        let credential = self.credential()?;
        let result = self.remediation.create_filter(credential, &domain).await;
        if let Err(err) = &result {
            self.reporter.status(err.to_string());
            self.reporter.error(err.to_string());
        }
        result
    }

    /// Creates the filter, then requests deletion of the sender's backlog.
    pub async fn request_full_unsubscribe(
        &self,
        domain: SenderDomain,
    ) -> SweepResult<UnsubscribeOutcome> {
        let filter = self.request_unsubscribe(domain.clone()).await?;
        let deletion = self.request_domain_deletion(domain).await?;
        Ok(UnsubscribeOutcome { filter, deletion })
    }

    /// Loads the provider's existing filters if not done yet this session.
    pub async fn refresh_filters(&self) -> SweepResult<()> {
        let credential = self.credential()?;
        self.remediation.ensure_filters_loaded(credential).await;
        Ok(())
    }

    /// True if the unsubscribe action would be redundant for `domain`.
    pub fn is_filtered(&self, domain: &SenderDomain) -> bool {
        self.remediation.is_filtered(domain)
    }

    /// Moves one message to the trash.
    pub async fn trash_message(&self, id: MessageId) -> SweepResult<()> {
        let credential = self.credential()?;
        self.remediation.trash_single(credential, &id).await
    }

    // ---- Status ----

    /// Latest status line, scan progress and error.
    pub fn status(&self) -> SweepStatus {
        self.reporter.current()
    }

    /// Last fatal error, cleared when analysis is started again.
    pub fn last_error(&self) -> Option<String> {
        self.reporter.current().last_error
    }

    /// Stream of every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SweepEvent> {
        self.reporter.subscribe()
    }
}

impl Drop for SweepHandler {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn lock_state(state: &Mutex<SessionState>) -> MutexGuard<'_, SessionState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn join_scan(handle: JoinHandle<ScanReport>) -> Option<ScanReport> {
    match handle.await {
        Ok(report) => Some(report),
        Err(err) => {
            tracing::error!(error = %err, "Scan task panicked");
            None
        }
    }
}

fn join(domains: &[SenderDomain]) -> String {
    domains
        .iter()
        .map(SenderDomain::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
