//! Progress and status reporting.
//!
//! Services publish [`SweepEvent`]s through a shared [`StatusReporter`],
//! which keeps the latest values for polling and fans every event out on a
//! broadcast channel for observers that want a stream.

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::domain::SenderDomain;

/// Lifecycle of a mailbox scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanPhase {
    /// No scan has run yet.
    #[default]
    Idle,
    /// Pages are being processed.
    Running,
    /// The cursor chain was exhausted.
    Completed,
    /// Stopped at a checkpoint; partial counts are kept.
    Cancelled,
    /// Aborted by a fatal error.
    Failed,
}

impl ScanPhase {
    pub fn is_running(self) -> bool {
        self == Self::Running
    }
}

/// Why a scan was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanTrigger {
    /// Explicit start from the caller.
    Requested,
    /// Full rescan after a deletion flow ended (confirmed, cancelled,
    /// aborted or resolved with nothing to delete).
    AfterDeletion,
}

/// Structured scan progress, suitable for a progress indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScanProgress {
    pub phase: ScanPhase,
    /// Messages processed so far in the current scan.
    pub processed: usize,
    /// Distinct senders found so far.
    pub senders: usize,
}

/// Phase of a pending deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionPhase {
    /// Message IDs are being collected.
    Counting,
    /// The frozen ID list awaits confirmation.
    Confirming,
    /// Messages are being trashed.
    Deleting,
}

/// Event emitted by the services.
#[derive(Debug, Clone, PartialEq)]
pub enum SweepEvent {
    /// Human-readable status line.
    Status(String),
    /// A scan started.
    ScanStarted(ScanTrigger),
    /// Scan progress after a page, or at a terminal transition.
    Scan(ScanProgress),
    /// A deletion entered a new phase.
    Deletion {
        phase: DeletionPhase,
        domains: Vec<SenderDomain>,
    },
    /// Trash progress after each chunk.
    TrashProgress {
        succeeded: usize,
        failed: usize,
        total: usize,
    },
    /// A deletion flow ended, either way.
    DeletionFinished,
    /// A fatal or operation-aborting error.
    Error(String),
}

/// Latest published values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepStatus {
    /// Last status line.
    pub message: String,
    /// Last scan progress.
    pub scan: ScanProgress,
    /// Phase of the pending deletion, if any.
    pub deletion: Option<DeletionPhase>,
    /// Last fatal error, cleared when a scan is explicitly requested.
    pub last_error: Option<String>,
}

/// Shared status sink.
#[derive(Debug)]
pub struct StatusReporter {
    sender: broadcast::Sender<SweepEvent>,
    state: Mutex<SweepStatus>,
}

impl Default for StatusReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusReporter {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(256);
        Self {
            sender,
            state: Mutex::new(SweepStatus::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, SweepStatus> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribes to events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SweepEvent> {
        self.sender.subscribe()
    }

    /// Returns the latest published values.
    pub fn current(&self) -> SweepStatus {
        self.state().clone()
    }

    /// Records and broadcasts an event.
    pub fn publish(&self, event: SweepEvent) {
        {
            let mut state = self.state();
            match &event {
                SweepEvent::Status(message) => state.message = message.clone(),
                SweepEvent::ScanStarted(ScanTrigger::Requested) => state.last_error = None,
                SweepEvent::ScanStarted(ScanTrigger::AfterDeletion) => {}
                SweepEvent::Scan(progress) => state.scan = *progress,
                SweepEvent::Deletion { phase, .. } => state.deletion = Some(*phase),
                SweepEvent::DeletionFinished => state.deletion = None,
                SweepEvent::Error(message) => state.last_error = Some(message.clone()),
                SweepEvent::TrashProgress { .. } => {}
            }
        }
        // No receivers is fine; state above is the source of truth for polling.
        let _ = self.sender.send(event);
    }

    pub fn status(&self, message: impl Into<String>) {
        self.publish(SweepEvent::Status(message.into()));
    }

    pub fn error(&self, message: impl Into<String>) {
        self.publish(SweepEvent::Error(message.into()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_updates_current_state() {
        let reporter = StatusReporter::new();
        reporter.status("Scanning...");
        reporter.publish(SweepEvent::Scan(ScanProgress {
            phase: ScanPhase::Running,
            processed: 100,
            senders: 7,
        }));
        reporter.publish(SweepEvent::Deletion {
            phase: DeletionPhase::Counting,
            domains: vec![SenderDomain::from("a.com")],
        });

        let status = reporter.current();
        assert_eq!(status.message, "Scanning...");
        assert_eq!(status.scan.processed, 100);
        assert_eq!(status.deletion, Some(DeletionPhase::Counting));

        reporter.publish(SweepEvent::DeletionFinished);
        assert!(reporter.current().deletion.is_none());
    }

    #[test]
    fn new_scan_clears_last_error() {
        let reporter = StatusReporter::new();
        reporter.error("boom");
        assert_eq!(reporter.current().last_error.as_deref(), Some("boom"));

        reporter.publish(SweepEvent::ScanStarted(ScanTrigger::Requested));
        assert!(reporter.current().last_error.is_none());
    }

    #[test]
    fn rescan_after_deletion_keeps_last_error() {
        let reporter = StatusReporter::new();
        reporter.error("listing failed");

        reporter.publish(SweepEvent::ScanStarted(ScanTrigger::AfterDeletion));
        assert_eq!(reporter.current().last_error.as_deref(), Some("listing failed"));
    }

    #[tokio::test]
    async fn subscribers_receive_events() {
        let reporter = StatusReporter::new();
        let mut rx = reporter.subscribe();
        reporter.status("hello");
        assert_eq!(rx.recv().await.unwrap(), SweepEvent::Status("hello".into()));
    }

    #[test]
    fn scan_phase_serialization() {
        let json = serde_json::to_string(&ScanPhase::Cancelled).unwrap();
        assert_eq!(json, "\"cancelled\"");
    }
}
