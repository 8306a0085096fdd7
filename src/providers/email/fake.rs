//! In-memory mailbox used by unit tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use super::{LabelModification, ListRequest, MailApi, MessagePage, ProviderError, Result};
use crate::domain::{
    headers, normalize_domain, system_labels, Credential, Header, MessageId, MessageMetadata,
    SenderFilter,
};

/// A recorded API call.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    List {
        query: Option<String>,
        page_token: Option<String>,
    },
    Metadata(MessageId),
    Trash(MessageId),
    BatchModify(Vec<MessageId>),
    CreateFilter(SenderFilter),
    ListFilters,
}

#[derive(Default)]
struct State {
    /// Messages in provider order, most recent first.
    messages: Vec<(MessageId, Option<String>)>,
    trashed: HashSet<MessageId>,
    filters: Vec<SenderFilter>,
    calls: Vec<Call>,
    list_failures: VecDeque<ProviderError>,
    query_failures: HashMap<String, ProviderError>,
    metadata_failures: HashMap<MessageId, ProviderError>,
    throttled_metadata: usize,
    trash_failures: HashMap<MessageId, ProviderError>,
    filter_failure: Option<ProviderError>,
    list_filters_failure: Option<ProviderError>,
    latency: Duration,
    in_flight: usize,
    max_in_flight: usize,
}

/// Mailbox whose trash actually removes messages from later listings.
#[derive(Default)]
pub(crate) struct FakeMailbox {
    state: Mutex<State>,
}

impl FakeMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a mailbox with `count` messages per domain, interleaved round-robin.
    pub fn with_senders(senders: &[(&str, usize)]) -> Self {
        let mailbox = Self::new();
        let longest = senders.iter().map(|(_, n)| *n).max().unwrap_or(0);
        let mut seq = 0;
        for round in 0..longest {
            for (domain, count) in senders {
                if round < *count {
                    seq += 1;
                    mailbox.add_message(
                        format!("m{:04}", seq),
                        Some(format!("Newsletter <news@{}>", domain)),
                    );
                }
            }
        }
        mailbox
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn add_message(&self, id: impl Into<MessageId>, from: Option<String>) {
        self.state().messages.push((id.into(), from));
    }

    pub fn add_message_without_from(&self, id: &str) {
        self.add_message(id, None);
    }

    pub fn add_filter(&self, filter: SenderFilter) {
        self.state().filters.push(filter);
    }

    pub fn fail_next_list(&self, err: ProviderError) {
        self.state().list_failures.push_back(err);
    }

    pub fn fail_query(&self, query: &str, err: ProviderError) {
        self.state().query_failures.insert(query.to_string(), err);
    }

    pub fn fail_metadata(&self, id: &str, err: ProviderError) {
        self.state().metadata_failures.insert(id.into(), err);
    }

    /// The next `n` metadata calls answer 429.
    pub fn throttle_next_metadata(&self, n: usize) {
        self.state().throttled_metadata = n;
    }

    pub fn fail_trash(&self, id: &MessageId, err: ProviderError) {
        self.state().trash_failures.insert(id.clone(), err);
    }

    pub fn fail_create_filter(&self, err: ProviderError) {
        self.state().filter_failure = Some(err);
    }

    /// The next `list_filters` call fails.
    pub fn fail_list_filters(&self, err: ProviderError) {
        self.state().list_filters_failure = Some(err);
    }

    /// Every metadata and trash call takes `latency` to answer.
    pub fn set_latency(&self, latency: Duration) {
        self.state().latency = latency;
    }

    /// Highest number of metadata or trash calls awaiting an answer at once.
    pub fn max_in_flight(&self) -> usize {
        self.state().max_in_flight
    }

    async fn begin_call(&self) {
        let latency = {
            let mut state = self.state();
            state.in_flight += 1;
            state.max_in_flight = state.max_in_flight.max(state.in_flight);
            state.latency
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    /// Locks the state and marks the call started by `begin_call` as answered.
    fn end_call(&self) -> MutexGuard<'_, State> {
        let mut state = self.state();
        state.in_flight -= 1;
        state
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn list_calls(&self) -> usize {
        self.count_calls(|c| matches!(c, Call::List { .. }))
    }

    pub fn metadata_calls(&self) -> usize {
        self.count_calls(|c| matches!(c, Call::Metadata(_)))
    }

    pub fn trash_calls(&self) -> usize {
        self.count_calls(|c| matches!(c, Call::Trash(_)))
    }

    pub fn filter_calls(&self) -> usize {
        self.count_calls(|c| matches!(c, Call::CreateFilter(_)))
    }

    fn count_calls(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.state().calls.iter().filter(|c| pred(c)).count()
    }

    pub fn filters(&self) -> Vec<SenderFilter> {
        self.state().filters.clone()
    }

    pub fn is_trashed(&self, id: &MessageId) -> bool {
        self.state().trashed.contains(id)
    }

    pub fn trashed_count(&self) -> usize {
        self.state().trashed.len()
    }

    /// IDs of untrashed messages from `domain`.
    pub fn ids_from(&self, domain: &str) -> Vec<MessageId> {
        let state = self.state();
        state
            .messages
            .iter()
            .filter(|(id, from)| !state.trashed.contains(id) && matches_domain(from, domain))
            .map(|(id, _)| id.clone())
            .collect()
    }
}

fn matches_domain(from: &Option<String>, domain: &str) -> bool {
    from.as_deref()
        .map(|f| normalize_domain(Some(f)).as_str() == domain)
        .unwrap_or(false)
}

fn check(credential: &Credential) -> Result<()> {
    if credential.is_empty() {
        Err(ProviderError::Unauthenticated)
    } else {
        Ok(())
    }
}

#[async_trait]
impl MailApi for FakeMailbox {
    async fn list_messages(
        &self,
        credential: &Credential,
        request: &ListRequest,
    ) -> Result<MessagePage> {
        check(credential)?;
        let mut state = self.state();
        state.calls.push(Call::List {
            query: request.query.clone(),
            page_token: request.page_token.clone(),
        });

        if let Some(err) = state.list_failures.pop_front() {
            return Err(err);
        }
        if let Some(query) = &request.query {
            if let Some(err) = state.query_failures.get(query) {
                return Err(err.clone());
            }
        }

        let sender = request
            .query
            .as_deref()
            .and_then(|q| q.strip_prefix("from:"));
        let matching: Vec<MessageId> = state
            .messages
            .iter()
            .filter(|(id, from)| {
                !state.trashed.contains(id) && sender.map_or(true, |d| matches_domain(from, d))
            })
            .map(|(id, _)| id.clone())
            .collect();

        let offset: usize = request
            .page_token
            .as_deref()
            .and_then(|t| t.parse().ok())
            .unwrap_or(0);
        let end = (offset + request.page_size as usize).min(matching.len());
        let message_ids = matching.get(offset..end).unwrap_or_default().to_vec();
        let next_page_token = (end < matching.len()).then(|| end.to_string());

        Ok(MessagePage {
            message_ids,
            next_page_token,
        })
    }

    async fn get_message_metadata(
        &self,
        credential: &Credential,
        id: &MessageId,
        _header_names: &[String],
    ) -> Result<MessageMetadata> {
        check(credential)?;
        self.begin_call().await;
        let mut state = self.end_call();
        state.calls.push(Call::Metadata(id.clone()));

        if state.throttled_metadata > 0 {
            state.throttled_metadata -= 1;
            return Err(ProviderError::Api {
                status: 429,
                message: "Too Many Requests".to_string(),
            });
        }
        if let Some(err) = state.metadata_failures.get(id) {
            return Err(err.clone());
        }

        let from = state
            .messages
            .iter()
            .find(|(m, _)| m == id)
            .map(|(_, from)| from.clone())
            .ok_or_else(|| ProviderError::Api {
                status: 404,
                message: "Requested entity was not found.".to_string(),
            })?;

        let headers = from
            .map(|f| vec![Header::new(headers::FROM, f)])
            .unwrap_or_default();
        Ok(MessageMetadata::new(id.clone(), headers))
    }

    async fn trash_message(&self, credential: &Credential, id: &MessageId) -> Result<()> {
        check(credential)?;
        self.begin_call().await;
        let mut state = self.end_call();
        state.calls.push(Call::Trash(id.clone()));

        if let Some(err) = state.trash_failures.get(id) {
            return Err(err.clone());
        }
        state.trashed.insert(id.clone());
        Ok(())
    }

    async fn batch_modify(
        &self,
        credential: &Credential,
        ids: &[MessageId],
        modification: &LabelModification,
    ) -> Result<()> {
        check(credential)?;
        let mut state = self.state();
        state.calls.push(Call::BatchModify(ids.to_vec()));

        if modification
            .add_label_ids
            .iter()
            .any(|l| l == system_labels::TRASH)
        {
            state.trashed.extend(ids.iter().cloned());
        }
        Ok(())
    }

    async fn create_filter(&self, credential: &Credential, filter: &SenderFilter) -> Result<()> {
        check(credential)?;
        let mut state = self.state();
        state.calls.push(Call::CreateFilter(filter.clone()));

        if let Some(err) = state.filter_failure.clone() {
            return Err(err);
        }
        state.filters.push(filter.clone());
        Ok(())
    }

    async fn list_filters(&self, credential: &Credential) -> Result<Vec<SenderFilter>> {
        check(credential)?;
        let mut state = self.state();
        state.calls.push(Call::ListFilters);

        if let Some(err) = state.list_filters_failure.take() {
            return Err(err);
        }
        Ok(state.filters.clone())
    }
}
