//! Integration tests for the sweep handler.
//!
//! These tests drive the public handler surface against an in-memory
//! mailbox, across the scanner, the aggregate and the remediation engine.
//! Each service module contains its own unit tests for detailed logic.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;

use mailsweep::config::{RemediationSettings, ScanSettings, Settings};
use mailsweep::domain::{
    headers, normalize_domain, system_labels, Credential, Header, MessageId, MessageMetadata,
    SenderDomain, SenderFilter,
};
use mailsweep::providers::email::{
    LabelModification, ListRequest, MailApi, MessagePage, ProviderError, Result,
};
use mailsweep::services::{ScanOutcome, ScanPhase, ScanTrigger, SenderCount, SweepEvent};
use mailsweep::SweepHandler;

// ============================================================================
// In-memory mailbox
// ============================================================================

#[derive(Default)]
struct Inner {
    messages: Vec<(MessageId, String)>,
    trashed: HashSet<MessageId>,
    filters: Vec<SenderFilter>,
    trash_calls: usize,
    create_filter_calls: usize,
    unauthorized: bool,
}

/// Mailbox where trashing removes a message from later listings.
#[derive(Default)]
struct Mailbox {
    inner: Mutex<Inner>,
}

impl Mailbox {
    fn with(senders: &[(&str, usize)]) -> Self {
        let mailbox = Self::default();
        {
            let mut inner = mailbox.inner.lock().unwrap();
            let longest = senders.iter().map(|(_, n)| *n).max().unwrap_or(0);
            for round in 0..longest {
                for (domain, count) in senders {
                    if round < *count {
                        let id = MessageId(format!("msg-{:05}", inner.messages.len() + 1));
                        let from = format!("\"{} News\" <news@mail.{}>", domain, domain);
                        inner.messages.push((id, from));
                    }
                }
            }
        }
        mailbox
    }

    fn live_ids(&self, sender: Option<&str>) -> Vec<MessageId> {
        let inner = self.inner.lock().unwrap();
        inner
            .messages
            .iter()
            .filter(|(id, _)| !inner.trashed.contains(id))
            .filter(|(_, from)| {
                sender.map_or(true, |d| normalize_domain(Some(from.as_str())).as_str() == d)
            })
            .map(|(id, _)| id.clone())
            .collect()
    }

    fn authorize(&self, credential: &Credential) -> Result<()> {
        if credential.is_empty() {
            return Err(ProviderError::Unauthenticated);
        }
        if self.inner.lock().unwrap().unauthorized {
            return Err(ProviderError::Api {
                status: 401,
                message: "Invalid Credentials".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl MailApi for Mailbox {
    async fn list_messages(
        &self,
        credential: &Credential,
        request: &ListRequest,
    ) -> Result<MessagePage> {
        self.authorize(credential)?;
        let sender = request
            .query
            .as_deref()
            .and_then(|q| q.strip_prefix("from:"));
        let ids = self.live_ids(sender);

        let offset: usize = request
            .page_token
            .as_deref()
            .map(|t| t.parse().unwrap())
            .unwrap_or(0);
        let end = (offset + request.page_size as usize).min(ids.len());
        Ok(MessagePage {
            message_ids: ids[offset.min(end)..end].to_vec(),
            next_page_token: (end < ids.len()).then(|| end.to_string()),
        })
    }

    async fn get_message_metadata(
        &self,
        credential: &Credential,
        id: &MessageId,
        header_names: &[String],
    ) -> Result<MessageMetadata> {
        self.authorize(credential)?;
        assert!(header_names.iter().any(|h| h == headers::FROM));

        let inner = self.inner.lock().unwrap();
        let (_, from) = inner
            .messages
            .iter()
            .find(|(m, _)| m == id)
            .ok_or_else(|| ProviderError::Api {
                status: 404,
                message: "Requested entity was not found.".to_string(),
            })?;
        Ok(MessageMetadata::new(
            id.clone(),
            vec![
                Header::new(headers::FROM, from.clone()),
                Header::new(headers::SUBJECT, "Weekly digest"),
            ],
        ))
    }

    async fn trash_message(&self, credential: &Credential, id: &MessageId) -> Result<()> {
        self.authorize(credential)?;
        let mut inner = self.inner.lock().unwrap();
        inner.trash_calls += 1;
        inner.trashed.insert(id.clone());
        Ok(())
    }

    async fn batch_modify(
        &self,
        credential: &Credential,
        ids: &[MessageId],
        modification: &LabelModification,
    ) -> Result<()> {
        self.authorize(credential)?;
        if modification
            .add_label_ids
            .iter()
            .any(|l| l == system_labels::TRASH)
        {
            self.inner.lock().unwrap().trashed.extend(ids.iter().cloned());
        }
        Ok(())
    }

    async fn create_filter(&self, credential: &Credential, filter: &SenderFilter) -> Result<()> {
        self.authorize(credential)?;
        let mut inner = self.inner.lock().unwrap();
        inner.create_filter_calls += 1;
        inner.filters.push(filter.clone());
        Ok(())
    }

    async fn list_filters(&self, credential: &Credential) -> Result<Vec<SenderFilter>> {
        self.authorize(credential)?;
        Ok(self.inner.lock().unwrap().filters.clone())
    }
}

fn fast_settings() -> Settings {
    Settings {
        scan: ScanSettings {
            page_size: 100,
            sub_batch_delay: Duration::ZERO,
            page_delay: Duration::ZERO,
            ..Default::default()
        },
        remediation: RemediationSettings {
            trash_chunk_delay: Duration::ZERO,
            ..Default::default()
        },
        ..Default::default()
    }
}

fn session(mailbox: &Arc<Mailbox>) -> SweepHandler {
    SweepHandler::new(
        mailbox.clone(),
        Some(Credential::new("ya29.test-token")),
        fast_settings(),
    )
}

/// Twelve senders, 250 messages, 40 of them from spammer.test.
const MAILBOX: &[(&str, usize)] = &[
    ("spammer.test", 40),
    ("shop.co.uk", 30),
    ("news.com", 25),
    ("bank.org", 22),
    ("social.net", 20),
    ("school.edu", 19),
    ("agency.gov", 18),
    ("friends.io", 17),
    ("travel.com.au", 16),
    ("games.dev", 15),
    ("music.fm", 14),
    ("books.example", 14),
];

// ============================================================================
// End-to-end scenario
// ============================================================================

#[tokio::test]
async fn scan_then_delete_a_spammer() {
    let mailbox = Arc::new(Mailbox::with(MAILBOX));
    let handler = session(&mailbox);

    handler.start_analysis().await.unwrap();
    let report = handler.wait_for_scan().await.unwrap();

    assert_eq!(report.outcome, ScanOutcome::Completed);
    assert_eq!(report.processed, 250);
    assert_eq!(report.pages, 3);

    let snapshot = handler.aggregate_snapshot();
    assert_eq!(snapshot.len(), 12);
    assert_eq!(snapshot[0], SenderCount::new("spammer.test", 40));
    assert_eq!(snapshot.iter().map(|s| s.total).sum::<u64>(), 250);

    let prompt = handler
        .request_domain_deletion(SenderDomain::from("spammer.test"))
        .await
        .unwrap();
    assert!(prompt.needs_confirmation());
    let pending = handler.pending_deletion().unwrap();
    assert_eq!(pending.count(), 40);

    let mut events = handler.subscribe();
    let deletion = handler.confirm_domain_deletion().await.unwrap();

    assert_eq!(deletion.message, "Successfully deleted 40 emails.");
    assert_eq!(deletion.summary.succeeded, 40);
    assert_eq!(mailbox.inner.lock().unwrap().trash_calls, 40);

    let mut chunks = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let SweepEvent::TrashProgress { succeeded, total, .. } = event {
            assert_eq!(total, 40);
            chunks.push(succeeded);
        }
    }
    assert_eq!(chunks, vec![10, 20, 30, 40]);

    let rescan = handler.wait_for_scan().await.unwrap();
    assert_eq!(rescan.trigger, ScanTrigger::AfterDeletion);
    assert_eq!(rescan.processed, 210);

    let snapshot = handler.aggregate_snapshot();
    assert_eq!(snapshot.len(), 11);
    assert!(snapshot.iter().all(|s| s.domain.as_str() != "spammer.test"));
}

#[tokio::test]
async fn multi_part_suffixes_are_grouped() {
    let mailbox = Arc::new(Mailbox::with(&[("shop.co.uk", 3), ("travel.com.au", 2)]));
    let handler = session(&mailbox);

    handler.start_analysis().await.unwrap();
    handler.wait_for_scan().await.unwrap();

    assert_eq!(
        handler.aggregate_snapshot(),
        vec![
            SenderCount::new("shop.co.uk", 3),
            SenderCount::new("travel.com.au", 2),
        ]
    );
}

#[tokio::test]
async fn bulk_delete_and_unsubscribe() {
    let mailbox = Arc::new(Mailbox::with(MAILBOX));
    let handler = session(&mailbox);
    handler.start_analysis().await.unwrap();
    handler.wait_for_scan().await.unwrap();

    handler.select_sender(SenderDomain::from("news.com"));
    handler.select_sender(SenderDomain::from("music.fm"));
    handler.request_selected_deletion().await.unwrap();
    let report = handler.confirm_bulk_deletion().await.unwrap();

    assert_eq!(report.summary.succeeded, 39);
    assert!(handler.selected_senders().is_empty());
    handler.wait_for_scan().await.unwrap();
    assert_eq!(handler.aggregate_snapshot().len(), 10);

    let spammer = SenderDomain::from("spammer.test");
    let outcome = handler.request_full_unsubscribe(spammer.clone()).await.unwrap();
    assert!(outcome.deletion.needs_confirmation());
    handler.confirm_domain_deletion().await.unwrap();
    assert!(handler.is_filtered(&spammer));

    handler.request_unsubscribe(spammer).await.unwrap();
    assert_eq!(mailbox.inner.lock().unwrap().create_filter_calls, 1);
}

#[tokio::test]
async fn revoked_token_fails_the_scan() {
    let mailbox = Arc::new(Mailbox::with(&[("a.com", 5)]));
    mailbox.inner.lock().unwrap().unauthorized = true;
    let handler = session(&mailbox);

    handler.start_analysis().await.unwrap();
    let report = handler.wait_for_scan().await.unwrap();

    assert!(matches!(report.outcome, ScanOutcome::Failed(ref e) if e.is_fatal()));
    assert_eq!(handler.status().scan.phase, ScanPhase::Failed);
    assert!(handler.last_error().unwrap().contains("Invalid Credentials"));
}

// ============================================================================
// Domain normalization
// ============================================================================

#[test]
fn normalization_examples() {
    assert_eq!(
        normalize_domain(Some("Promo <deals@news.example.co.uk>")).as_str(),
        "example.co.uk"
    );
    assert_eq!(normalize_domain(Some("a@mail.example.com")).as_str(), "example.com");
    assert_eq!(normalize_domain(Some("not-an-email")).as_str(), "unknown_sender");
    assert_eq!(normalize_domain(None).as_str(), "unknown_sender");
}

#[test]
fn normalization_is_total() {
    let inputs = [
        "",
        " ",
        "@",
        "a@",
        "<>",
        "<@>",
        "\"x\" <y@z>",
        "UPPER@CASE.COM",
        "a@b.c.d.e.f",
        "weird@@double.at.com",
        "trailing@dot.example.com.",
    ];
    for input in inputs {
        let domain = normalize_domain(Some(input));
        assert!(!domain.as_str().is_empty(), "empty domain for {:?}", input);
        assert_eq!(domain, normalize_domain(Some(input)));
    }
}
