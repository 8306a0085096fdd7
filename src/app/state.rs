//! Session state management.
//!
//! Centralized per-session state for the handler: the sender selection used
//! by bulk deletion, the deletion awaiting confirmation, and the report of
//! the last finished scan.

use std::collections::BTreeSet;

use crate::domain::SenderDomain;
use crate::services::{PendingDeletion, ScanReport};

/// Mutable session state guarded by the handler.
#[derive(Debug, Default)]
pub struct SessionState {
    /// Senders selected for bulk deletion.
    selected_senders: BTreeSet<SenderDomain>,
    /// Deletion counted and awaiting confirmation, or being executed.
    pending: Option<PendingDeletion>,
    /// True from the start of counting until the flow resolves.
    deletion_active: bool,
    /// Report of the most recent finished scan.
    last_scan: Option<ScanReport>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select a sender.
    pub fn select_sender(&mut self, domain: SenderDomain) {
        self.selected_senders.insert(domain);
    }

    /// Deselect a sender.
    pub fn deselect_sender(&mut self, domain: &SenderDomain) {
        self.selected_senders.remove(domain);
    }

    /// Toggle sender selection.
    pub fn toggle_sender(&mut self, domain: &SenderDomain) {
        if !self.selected_senders.remove(domain) {
            self.selected_senders.insert(domain.clone());
        }
    }

    /// Check if a sender is selected.
    pub fn is_sender_selected(&self, domain: &SenderDomain) -> bool {
        self.selected_senders.contains(domain)
    }

    /// Selected senders in sorted order.
    pub fn selected_senders(&self) -> Vec<SenderDomain> {
        self.selected_senders.iter().cloned().collect()
    }

    /// Get the number of selected senders.
    pub fn selection_count(&self) -> usize {
        self.selected_senders.len()
    }

    /// Check if we have any selection.
    pub fn has_selection(&self) -> bool {
        !self.selected_senders.is_empty()
    }

    /// Clear sender selection.
    pub fn clear_selection(&mut self) {
        self.selected_senders.clear();
    }

    /// Marks a deletion flow as started. Returns false if one already is.
    pub fn begin_deletion(&mut self) -> bool {
        if self.deletion_active {
            return false;
        }
        self.deletion_active = true;
        true
    }

    pub fn is_deletion_active(&self) -> bool {
        self.deletion_active
    }

    /// Stores a counted deletion for confirmation.
    pub fn set_pending(&mut self, pending: PendingDeletion) {
        self.pending = Some(pending);
    }

    pub fn pending(&self) -> Option<&PendingDeletion> {
        self.pending.as_ref()
    }

    /// Takes the pending deletion out for execution.
    pub fn take_pending(&mut self) -> Option<PendingDeletion> {
        self.pending.take()
    }

    /// Ends the deletion flow, discarding anything still pending.
    pub fn end_deletion(&mut self) {
        self.pending = None;
        self.deletion_active = false;
    }

    pub fn set_last_scan(&mut self, report: ScanReport) {
        self.last_scan = Some(report);
    }

    pub fn last_scan(&self) -> Option<&ScanReport> {
        self.last_scan.as_ref()
    }
}
