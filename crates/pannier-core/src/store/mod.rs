//! Sync state store
//!
//! The single source of truth the rest of the application observes: the
//! in-memory collection plus request-lifecycle flags. State is mutated
//! exclusively by dispatching [`SyncEvent`]s through the pure [`reduce`]
//! function; all I/O lives in the orchestration layer.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

use crate::models::Item;

/// Snapshot of the sync state.
///
/// Created once at startup with empty collection and all flags false,
/// never persisted itself (only the cache survives restarts).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncState {
    /// Collection snapshot; new entities first, no duplicate identifiers
    pub items: Vec<Item>,
    /// A fetch is in flight
    pub fetching: bool,
    /// Last fetch failure
    pub fetch_error: Option<String>,
    /// A save is in flight
    pub saving: bool,
    /// Last save failure
    pub save_error: Option<String>,
    /// A delete is in flight
    pub deleting: bool,
    /// Last delete failure
    pub delete_error: Option<String>,
    /// Current connectivity
    pub online: bool,
    /// Some changes exist only locally and await reconciliation
    pub pending_sync: bool,
}

/// Named state transitions.
///
/// Within one logical operation the Started event strictly precedes its
/// terminal Succeeded/Failed event.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    FetchStarted,
    /// Full replacement of the collection
    FetchSucceeded(Vec<Item>),
    FetchFailed(String),
    SaveStarted,
    /// Upsert: replace in place when the identifier is known, else prepend
    SaveSucceeded(Item),
    SaveFailed(String),
    DeleteStarted,
    /// Remove by identifier; unknown identifiers are a no-op
    DeleteSucceeded(Item),
    DeleteFailed(String),
    ConnectivityChanged(bool),
    PendingSync(bool),
}

/// Pure transition function from (state, event) to the next state.
#[must_use]
pub fn reduce(mut state: SyncState, event: SyncEvent) -> SyncState {
    match event {
        SyncEvent::FetchStarted => {
            state.fetching = true;
            state.fetch_error = None;
        }
        SyncEvent::FetchSucceeded(items) => {
            state.items = items;
            state.fetching = false;
        }
        SyncEvent::FetchFailed(error) => {
            state.fetch_error = Some(error);
            state.fetching = false;
        }
        SyncEvent::SaveStarted => {
            state.saving = true;
            state.save_error = None;
        }
        SyncEvent::SaveSucceeded(item) => {
            upsert(&mut state.items, item);
            state.saving = false;
        }
        SyncEvent::SaveFailed(error) => {
            state.save_error = Some(error);
            state.saving = false;
        }
        SyncEvent::DeleteStarted => {
            state.deleting = true;
            state.delete_error = None;
        }
        SyncEvent::DeleteSucceeded(item) => {
            if let Some(index) = state.items.iter().position(|it| it.id == item.id) {
                state.items.remove(index);
            }
            state.deleting = false;
        }
        SyncEvent::DeleteFailed(error) => {
            state.delete_error = Some(error);
            state.deleting = false;
        }
        SyncEvent::ConnectivityChanged(online) => {
            state.online = online;
        }
        SyncEvent::PendingSync(pending) => {
            state.pending_sync = pending;
        }
    }
    state
}

fn upsert(items: &mut Vec<Item>, item: Item) {
    match items.iter_mut().find(|it| it.id == item.id) {
        Some(existing) => *existing = item,
        None => items.insert(0, item),
    }
}

/// Process-wide store wrapping the state in a watch channel.
///
/// `dispatch` applies one transition atomically; a reader never observes an
/// intermediate state. Subscribers are woken after every transition.
#[derive(Debug, Clone)]
pub struct SyncStore {
    tx: Arc<watch::Sender<SyncState>>,
}

impl SyncStore {
    /// Create a store with the initial state
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SyncState::default());
        Self { tx: Arc::new(tx) }
    }

    /// Apply one transition
    pub fn dispatch(&self, event: SyncEvent) {
        self.tx.send_modify(|state| {
            let current = std::mem::take(state);
            *state = reduce(current, event);
        });
    }

    /// Clone of the current state
    #[must_use]
    pub fn snapshot(&self) -> SyncState {
        self.tx.borrow().clone()
    }

    /// Subscribe to state changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.tx.subscribe()
    }
}

impl Default for SyncStore {
    fn default() -> Self {
        Self::new()
    }
}
