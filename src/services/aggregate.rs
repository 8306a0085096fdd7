//! Sender aggregate store.
//!
//! The [`SenderStore`] maps each sender domain to the number of messages
//! observed from it during the current scan. Only the scanner and
//! completed deletions mutate it; every operation takes the store's lock
//! once, so a removal is atomic with respect to a concurrent upsert.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::domain::SenderDomain;

/// One row of the aggregate snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderCount {
    /// Sender domain.
    pub domain: SenderDomain,
    /// Messages observed from this domain.
    pub total: u64,
}

impl SenderCount {
    pub fn new(domain: impl Into<SenderDomain>, total: u64) -> Self {
        Self {
            domain: domain.into(),
            total,
        }
    }
}

/// One page of the ordered sender list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderPage {
    /// Senders on this page, highest total first.
    pub senders: Vec<SenderCount>,
    /// 1-based page number that was requested.
    pub page: usize,
    /// Number of pages at this page size.
    pub total_pages: usize,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    total: u64,
    /// Insertion sequence, for stable tie-breaking.
    first_seen: u64,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<SenderDomain, Entry>,
    next_seq: u64,
}

impl Inner {
    fn upsert(&mut self, domain: SenderDomain, delta: u64) {
        if let Some(entry) = self.entries.get_mut(&domain) {
            entry.total += delta;
            return;
        }
        if delta == 0 {
            return;
        }
        let first_seen = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(
            domain,
            Entry {
                total: delta,
                first_seen,
            },
        );
    }
}

/// Thread-safe sender domain → message count index.
#[derive(Debug, Default)]
pub struct SenderStore {
    inner: Mutex<Inner>,
}

impl SenderStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds `delta` to a domain's total, creating the entry on first sight.
    pub fn upsert(&self, domain: SenderDomain, delta: u64) {
        self.lock().upsert(domain, delta);
    }

    /// Folds many observations in under one lock, in iteration order.
    pub fn upsert_many<I>(&self, observations: I)
    where
        I: IntoIterator<Item = (SenderDomain, u64)>,
    {
        let mut inner = self.lock();
        for (domain, delta) in observations {
            inner.upsert(domain, delta);
        }
    }

    /// Removes a domain entirely, returning its total.
    pub fn remove(&self, domain: &SenderDomain) -> Option<u64> {
        self.lock().entries.remove(domain).map(|e| e.total)
    }

    /// Empties the store and restarts insertion order.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.next_seq = 0;
    }

    pub fn get(&self, domain: &SenderDomain) -> Option<u64> {
        self.lock().entries.get(domain).map(|e| e.total)
    }

    pub fn contains(&self, domain: &SenderDomain) -> bool {
        self.lock().entries.contains_key(domain)
    }

    /// Number of distinct senders.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sum of all totals.
    pub fn total_messages(&self) -> u64 {
        self.lock().entries.values().map(|e| e.total).sum()
    }

    /// Returns all senders ordered by total, highest first.
    ///
    /// Equal totals keep insertion order: the domain seen first ranks higher.
    pub fn snapshot(&self) -> Vec<SenderCount> {
        let inner = self.lock();
        let mut rows: Vec<(&SenderDomain, &Entry)> = inner.entries.iter().collect();
        rows.sort_by(|(_, a), (_, b)| {
            b.total
                .cmp(&a.total)
                .then_with(|| a.first_seen.cmp(&b.first_seen))
        });
        rows.into_iter()
            .map(|(domain, entry)| SenderCount {
                domain: domain.clone(),
                total: entry.total,
            })
            .collect()
    }

    /// Returns one page of the ordered snapshot.
    ///
    /// Pages are 1-based. A page past the end, page 0, or a zero page size
    /// yields an empty slice.
    pub fn page(&self, page: usize, per_page: usize) -> SenderPage {
        let snapshot = self.snapshot();
        let total_pages = if per_page == 0 {
            0
        } else {
            snapshot.len().div_ceil(per_page)
        };

        let senders = if page == 0 || page > total_pages {
            Vec::new()
        } else {
            snapshot
                .into_iter()
                .skip((page - 1) * per_page)
                .take(per_page)
                .collect()
        };

        SenderPage {
            senders,
            page,
            total_pages,
        }
    }
}
