//! Copy-on-write holder for the current [`GuidingState`].

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use tracing::trace;

use super::{GuidingState, STATE_TARGET};

/// Owns the latest snapshot and fans changes out to subscribers.
///
/// Writers build a new state from a clone of the current one and swap the
/// pointer, so readers never observe a half-applied update. Updates are
/// serialised by `writer`; the read/write lock is held only to copy or swap
/// the pointer, so [`StateStore::snapshot`] never waits on a reducer or on
/// subscriber fan-out.
#[derive(Default)]
pub(crate) struct StateStore {
    writer: Mutex<()>,
    current: RwLock<Arc<GuidingState>>,
    subscribers: Mutex<Vec<Sender<Arc<GuidingState>>>>,
}

impl StateStore {
    pub(crate) fn snapshot(&self) -> Arc<GuidingState> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub(crate) fn subscribe(&self) -> Subscription {
        let (sender, receiver) = mpsc::channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sender);
        Subscription { receiver }
    }

    /// Replaces the snapshot with `update(current)`.
    ///
    /// Returns `false`, publishing nothing, when the update changes nothing.
    pub(crate) fn apply<F>(&self, update: F) -> bool
    where
        F: FnOnce(GuidingState) -> GuidingState,
    {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.snapshot();
        let next = update(GuidingState::clone(&current));
        if next == *current {
            return false;
        }
        let published = Arc::new(next);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&published);

        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|subscriber| subscriber.send(Arc::clone(&published)).is_ok());
        trace!(target: STATE_TARGET, subscribers = subscribers.len(), "published state");
        true
    }
}

/// Stream of state snapshots, one per change.
///
/// Iteration blocks until the next change and ends once the owning session
/// is dropped. Snapshots queue without bound until read, so a subscription
/// that is no longer consumed should be dropped; the store forgets it on the
/// next change.
pub struct Subscription {
    receiver: Receiver<Arc<GuidingState>>,
}

impl Subscription {
    /// Waits up to `timeout` for the next snapshot.
    #[must_use]
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Arc<GuidingState>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(state) => Some(state),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Returns the next snapshot if one is already queued.
    #[must_use]
    pub fn try_next(&self) -> Option<Arc<GuidingState>> {
        self.receiver.try_recv().ok()
    }
}

impl Iterator for Subscription {
    type Item = Arc<GuidingState>;

    fn next(&mut self) -> Option<Self::Item> {
        self.receiver.recv().ok()
    }
}
