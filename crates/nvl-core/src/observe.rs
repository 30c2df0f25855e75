//! Injected observability for extraction and reconciliation.
//!
//! Components never reach for a global logger; they report [`IngestEvent`]s to an
//! [`IngestObserver`] handed in by the caller. Every event also knows how to log itself.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::game::IdentityKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelField {
    Category,
    Division,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum IngestEvent {
    UnknownLabel {
        field: LabelField,
        text: String,
    },
    Discarded {
        home: String,
        away: String,
        date: NaiveDate,
        reason: String,
    },
    MalformedFragment {
        reason: String,
    },
    FieldConflict {
        key: IdentityKey,
        field: &'static str,
        existing: String,
        incoming: String,
    },
    FieldUnset {
        key: IdentityKey,
        field: &'static str,
    },
    ResultReplaced {
        key: IdentityKey,
        existing: String,
        incoming: String,
    },
    UnmatchedUpdate {
        key: IdentityKey,
    },
    DateChanged {
        key: IdentityKey,
        from: NaiveDate,
        to: NaiveDate,
    },
    AmbiguousMatch {
        key: IdentityKey,
        candidates: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    UnknownLabel,
    Discarded,
    MalformedFragment,
    FieldConflict,
    FieldUnset,
    ResultReplaced,
    UnmatchedUpdate,
    DateChanged,
    AmbiguousMatch,
}

impl IngestEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            IngestEvent::UnknownLabel { .. } => EventKind::UnknownLabel,
            IngestEvent::Discarded { .. } => EventKind::Discarded,
            IngestEvent::MalformedFragment { .. } => EventKind::MalformedFragment,
            IngestEvent::FieldConflict { .. } => EventKind::FieldConflict,
            IngestEvent::FieldUnset { .. } => EventKind::FieldUnset,
            IngestEvent::ResultReplaced { .. } => EventKind::ResultReplaced,
            IngestEvent::UnmatchedUpdate { .. } => EventKind::UnmatchedUpdate,
            IngestEvent::DateChanged { .. } => EventKind::DateChanged,
            IngestEvent::AmbiguousMatch { .. } => EventKind::AmbiguousMatch,
        }
    }

    pub fn emit(&self) {
        match self {
            IngestEvent::UnknownLabel { field, text } => {
                error!(?field, %text, "unrecognized label; using unknown");
            }
            IngestEvent::Discarded {
                home,
                away,
                date,
                reason,
            } => {
                warn!(%date, %home, %away, %reason, "invalid result discarded");
            }
            IngestEvent::MalformedFragment { reason } => {
                error!(%reason, "malformed match card skipped");
            }
            IngestEvent::FieldConflict {
                key,
                field,
                existing,
                incoming,
            } => {
                warn!(%key, %field, %existing, %incoming, "conflicting values; incoming wins");
            }
            IngestEvent::FieldUnset { key, field } => {
                debug!(%key, %field, "field empty on both sides");
            }
            IngestEvent::ResultReplaced {
                key,
                existing,
                incoming,
            } => {
                warn!(%key, %existing, %incoming, "result replaced by incoming record");
            }
            IngestEvent::UnmatchedUpdate { key } => {
                warn!(%key, "unmatched update; merging");
            }
            IngestEvent::DateChanged { key, from, to } => {
                warn!(%key, %from, %to, "match date changed");
            }
            IngestEvent::AmbiguousMatch { key, candidates } => {
                error!(%key, candidates, "no unique match; appended for manual review");
            }
        }
    }
}

pub trait IngestObserver: Send + Sync {
    fn observe(&self, event: IngestEvent);
}

/// Logs events and keeps nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl IngestObserver for TracingObserver {
    fn observe(&self, event: IngestEvent) {
        event.emit();
    }
}

/// Logs events and retains them so callers can count and report them.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<IngestEvent>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<IngestEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.kind() == kind)
            .count()
    }

    pub fn counts(&self) -> BTreeMap<EventKind, usize> {
        let mut counts = BTreeMap::new();
        for event in self
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
        {
            *counts.entry(event.kind()).or_default() += 1;
        }
        counts
    }

    pub fn take(&self) -> Vec<IngestEvent> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl IngestObserver for EventLog {
    fn observe(&self, event: IngestEvent) {
        event.emit();
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}
