//! The shared buffer and its publish/delete operations.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tracing::trace;

use crate::subscription::Subscription;

/// Position of an item in a [`Topic`].
///
/// Sequences are assigned in publish order and never reused, so a cursor
/// stays valid when items before or after it are deleted.
pub type Sequence = u64;

/// Where a new subscription starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartAt {
    /// Replay the full retained history, then continue live.
    Beginning,
    /// Only deliver items published after subscribing.
    End,
}

/// Buffer state guarded by the topic mutex.
pub(crate) struct State<T> {
    /// Retained items keyed by sequence.
    pub(crate) items: BTreeMap<Sequence, T>,
    /// Sequence the next published item receives.
    pub(crate) next_sequence: Sequence,
    /// Identifiers of open subscriptions.
    pub(crate) subscribers: HashSet<u64>,
    /// Identifier the next subscription receives.
    pub(crate) next_subscriber: u64,
}

/// State shared between a topic and its subscriptions.
pub(crate) struct Shared<T> {
    state: Mutex<State<T>>,
    /// Woken on every publish and every close.
    pub(crate) notify: Notify,
}

impl<T> Shared<T> {
    /// Lock the buffer state. A poisoned lock is recovered: every critical
    /// section leaves the state consistent before it can panic.
    pub(crate) fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// An append-only broadcast buffer with replay.
pub struct Topic<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Topic<T> {
    /// Create an empty topic.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    items: BTreeMap::new(),
                    next_sequence: 0,
                    subscribers: HashSet::new(),
                    next_subscriber: 0,
                }),
                notify: Notify::new(),
            }),
        }
    }

    /// Append an item and wake every waiting subscription.
    ///
    /// Returns the sequence assigned to the item. The append and the
    /// sequence assignment happen under one lock, so concurrent publishes
    /// are totally ordered and no reader can see a partial append.
    pub fn publish(&self, item: T) -> Sequence {
        let sequence = {
            let mut state = self.shared.lock();
            let sequence = state.next_sequence;
            state.next_sequence = sequence.saturating_add(1);
            state.items.insert(sequence, item);
            sequence
        };
        self.shared.notify.notify_waiters();
        sequence
    }

    /// Open a new subscription.
    pub fn subscribe(&self, start: StartAt) -> Subscription<T> {
        let (id, cursor) = {
            let mut state = self.shared.lock();
            let id = state.next_subscriber;
            state.next_subscriber = id.saturating_add(1);
            state.subscribers.insert(id);
            let cursor = match start {
                StartAt::Beginning => 0,
                StartAt::End => state.next_sequence,
            };
            (id, cursor)
        };
        trace!(subscriber = id, cursor, "subscribed");
        Subscription::new(Arc::clone(&self.shared), id, cursor)
    }

    /// Delete every retained item matching `predicate`.
    ///
    /// Subscriptions that have not reached a deleted item will skip it.
    /// Returns the number of items deleted.
    pub fn delete_where(&self, mut predicate: impl FnMut(&T) -> bool) -> usize {
        let mut state = self.shared.lock();
        let before = state.items.len();
        state.items.retain(|_, item| !predicate(item));
        before.saturating_sub(state.items.len())
    }

    /// Delete every retained item matching `predicate`, then append `item`.
    ///
    /// Both steps happen under one lock: no reader observes the buffer with
    /// the old items gone and the new one missing. Returns the number of
    /// deleted items and the sequence of the new one.
    pub fn replace_where(
        &self,
        mut predicate: impl FnMut(&T) -> bool,
        item: T,
    ) -> (usize, Sequence) {
        let (deleted, sequence) = {
            let mut state = self.shared.lock();
            let before = state.items.len();
            state.items.retain(|_, existing| !predicate(existing));
            let deleted = before.saturating_sub(state.items.len());
            let sequence = state.next_sequence;
            state.next_sequence = sequence.saturating_add(1);
            state.items.insert(sequence, item);
            (deleted, sequence)
        };
        self.shared.notify.notify_waiters();
        (deleted, sequence)
    }

    /// Delete the item at `sequence`, returning it if it was still retained.
    pub fn delete_sequence(&self, sequence: Sequence) -> Option<T> {
        self.shared.lock().items.remove(&sequence)
    }

    /// Delete the first retained item equal to `item`.
    ///
    /// Returns whether an item was deleted.
    pub fn delete(&self, item: &T) -> bool
    where
        T: PartialEq,
    {
        let mut state = self.shared.lock();
        let found = state
            .items
            .iter()
            .find(|(_, candidate)| *candidate == item)
            .map(|(sequence, _)| *sequence);
        found.is_some_and(|sequence| state.items.remove(&sequence).is_some())
    }

    /// Number of retained items.
    pub fn len(&self) -> usize {
        self.shared.lock().items.len()
    }

    /// Whether no items are retained.
    pub fn is_empty(&self) -> bool {
        self.shared.lock().items.is_empty()
    }

    /// Number of open subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.shared.lock().subscribers.len()
    }

    /// Clone the retained items, in publish order, from one consistent
    /// view of the buffer.
    pub fn snapshot(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.shared.lock().items.values().cloned().collect()
    }

    /// Like [`snapshot`](Self::snapshot), paired with each item's sequence.
    pub fn entries(&self) -> Vec<(Sequence, T)>
    where
        T: Clone,
    {
        self.shared
            .lock()
            .items
            .iter()
            .map(|(sequence, item)| (*sequence, item.clone()))
            .collect()
    }
}

impl<T> Default for Topic<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Topic<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("Topic")
            .field("len", &state.items.len())
            .field("next_sequence", &state.next_sequence)
            .field("subscribers", &state.subscribers.len())
            .finish()
    }
}
