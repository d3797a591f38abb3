use std::collections::VecDeque;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tel_store::EntryStore;
use tel_types::{AuditEvent, EventType, LedgerEntry, Severity, Timestamp};

use crate::error::LedgerError;

/// Conjunction of optional predicates over events. An empty filter matches
/// everything.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryFilter {
    pub actor_id: Option<String>,
    pub event_type: Option<EventType>,
    /// Exact severity.
    pub severity: Option<Severity>,
    /// Severity at or above this level.
    pub min_severity: Option<Severity>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    /// Inclusive lower bound on capture time.
    pub time_from: Option<Timestamp>,
    /// Inclusive upper bound on capture time.
    pub time_to: Option<Timestamp>,
}

impl QueryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn actor(mut self, id: impl Into<String>) -> Self {
        self.actor_id = Some(id.into());
        self
    }

    pub fn event_type(mut self, event_type: EventType) -> Self {
        self.event_type = Some(event_type);
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn min_severity(mut self, severity: Severity) -> Self {
        self.min_severity = Some(severity);
        self
    }

    pub fn resource(mut self, resource_type: impl Into<String>, resource_id: impl Into<String>) -> Self {
        self.resource_type = Some(resource_type.into());
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn resource_type(mut self, resource_type: impl Into<String>) -> Self {
        self.resource_type = Some(resource_type.into());
        self
    }

    pub fn time_range(mut self, from: Option<Timestamp>, to: Option<Timestamp>) -> Self {
        self.time_from = from;
        self.time_to = to;
        self
    }

    pub fn matches(&self, event: &AuditEvent) -> bool {
        self.actor_id.as_ref().map_or(true, |id| &event.actor.id == id)
            && self.event_type.map_or(true, |t| event.event_type == t)
            && self.severity.map_or(true, |s| event.severity == s)
            && self
                .min_severity
                .map_or(true, |s| event.severity.meets_threshold(s))
            && self
                .resource_type
                .as_ref()
                .map_or(true, |t| &event.resource.resource_type == t)
            && self
                .resource_id
                .as_ref()
                .map_or(true, |id| &event.resource.resource_id == id)
            && self.time_from.map_or(true, |from| event.timestamp >= from)
            && self.time_to.map_or(true, |to| event.timestamp <= to)
    }
}

/// Lazy, restartable iterator over entries matching a [`QueryFilter`].
///
/// Pinned to the ledger length when created: entries appended afterwards
/// are never yielded, so re-running it over an unchanged prefix produces the
/// same sequence. Entries are read from the store one page at a time.
pub struct QueryIter {
    store: Arc<dyn EntryStore>,
    filter: QueryFilter,
    snapshot_len: u64,
    page_size: u64,
    cursor: u64,
    buffer: VecDeque<LedgerEntry>,
}

impl QueryIter {
    pub(crate) fn new(
        store: Arc<dyn EntryStore>,
        filter: QueryFilter,
        snapshot_len: u64,
        page_size: u64,
    ) -> Self {
        Self {
            store,
            filter,
            snapshot_len,
            page_size,
            cursor: 0,
            buffer: VecDeque::new(),
        }
    }

    /// Rewind to the first entry of the pinned snapshot.
    pub fn restart(&mut self) {
        self.cursor = 0;
        self.buffer.clear();
    }

    /// Ledger length this iterator was pinned to.
    pub fn snapshot_len(&self) -> u64 {
        self.snapshot_len
    }

    pub fn filter(&self) -> &QueryFilter {
        &self.filter
    }

    fn fill(&mut self) -> Result<(), LedgerError> {
        let end = self
            .cursor
            .saturating_add(self.page_size - 1)
            .min(self.snapshot_len - 1);
        let page = self.store.read_range(self.cursor, end)?;
        if page.is_empty() {
            return Err(LedgerError::EntryMissing {
                sequence: self.cursor,
            });
        }
        self.cursor += page.len() as u64;
        let filter = &self.filter;
        self.buffer
            .extend(page.into_iter().filter(|e| filter.matches(&e.event)));
        Ok(())
    }
}

impl Iterator for QueryIter {
    type Item = Result<LedgerEntry, LedgerError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entry) = self.buffer.pop_front() {
                return Some(Ok(entry));
            }
            if self.cursor >= self.snapshot_len {
                return None;
            }
            if let Err(e) = self.fill() {
                // Stop after reporting; a later restart() may retry.
                self.cursor = self.snapshot_len;
                return Some(Err(e));
            }
        }
    }
}
