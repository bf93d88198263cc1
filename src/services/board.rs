use std::sync::Mutex;

use serde::Serialize;
use tokio::sync::watch;

use crate::errors::ClientError;
use crate::models::{Availability, TimeRange};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BoardSnapshot {
    pub availability: Availability,
    pub selected: Option<TimeRange>,
    pub last_error: Option<String>,
    pub sequence: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FetchTicket(u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied { cleared_selection: Option<TimeRange> },
    Discarded,
}

struct BoardInner {
    issued: u64,
    applied: u64,
    snapshot: BoardSnapshot,
}

pub struct SlotBoard {
    inner: Mutex<BoardInner>,
    tx: watch::Sender<BoardSnapshot>,
}

impl Default for SlotBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl SlotBoard {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(BoardSnapshot::default());
        Self {
            inner: Mutex::new(BoardInner {
                issued: 0,
                applied: 0,
                snapshot: BoardSnapshot::default(),
            }),
            tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<BoardSnapshot> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> BoardSnapshot {
        self.lock().snapshot.clone()
    }

    pub fn selected(&self) -> Option<TimeRange> {
        self.lock().snapshot.selected
    }

    pub fn begin_fetch(&self) -> FetchTicket {
        let mut inner = self.lock();
        inner.issued += 1;
        FetchTicket(inner.issued)
    }

    // Applies a fetch result unless a newer one already landed. A failed
    // fetch shows as an empty board with an error; the selection survives
    // because nothing says the slot is gone.
    pub fn apply(&self, ticket: FetchTicket, result: &Result<Availability, ClientError>) -> ApplyOutcome {
        let mut inner = self.lock();
        if ticket.0 <= inner.applied {
            tracing::debug!(ticket = ticket.0, applied = inner.applied, "discarding stale availability");
            return ApplyOutcome::Discarded;
        }
        inner.applied = ticket.0;

        let mut cleared_selection = None;
        match result {
            Ok(availability) => {
                if let Some(selected) = inner.snapshot.selected {
                    if !availability.is_selectable(&selected) {
                        inner.snapshot.selected = None;
                        cleared_selection = Some(selected);
                    }
                }
                inner.snapshot.availability = availability.clone();
                inner.snapshot.last_error = None;
            }
            Err(e) => {
                inner.snapshot.availability = Availability::empty();
                inner.snapshot.last_error = Some(e.to_string());
            }
        }
        inner.snapshot.sequence = ticket.0;

        let snapshot = inner.snapshot.clone();
        drop(inner);
        self.tx.send_replace(snapshot);

        ApplyOutcome::Applied { cleared_selection }
    }

    pub fn select(&self, range: TimeRange) -> Result<Option<TimeRange>, ClientError> {
        let mut inner = self.lock();
        if !inner.snapshot.availability.is_selectable(&range) {
            return Err(ClientError::SlotUnavailable);
        }
        let previous = inner.snapshot.selected.replace(range);
        let snapshot = inner.snapshot.clone();
        drop(inner);
        self.tx.send_replace(snapshot);
        Ok(previous)
    }

    pub fn clear_selection(&self) -> Option<TimeRange> {
        let mut inner = self.lock();
        let previous = inner.snapshot.selected.take();
        if previous.is_some() {
            let snapshot = inner.snapshot.clone();
            drop(inner);
            self.tx.send_replace(snapshot);
        }
        previous
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BoardInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
