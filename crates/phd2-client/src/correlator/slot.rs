//! Exclusive in-flight slot with first-come, first-served hand-off.

use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

#[derive(Default)]
struct SlotQueue {
    busy: bool,
    waiters: VecDeque<Waiter>,
    next_ticket: u64,
}

struct Waiter {
    ticket: u64,
    wake: SyncSender<()>,
}

impl SlotQueue {
    /// Passes ownership to the oldest waiter, or frees the slot.
    fn hand_off(&mut self) {
        while let Some(waiter) = self.waiters.pop_front() {
            if waiter.wake.send(()).is_ok() {
                return;
            }
        }
        self.busy = false;
    }
}

/// Serialises commands so that at most one is in flight.
///
/// Each blocked caller waits on its own channel, so it is woken only by the
/// hand-off addressed to it or by its own deadline.
#[derive(Default)]
pub(crate) struct InFlightSlot {
    queue: Mutex<SlotQueue>,
}

/// Ownership of the slot; dropping it wakes the next waiter.
pub(crate) struct SlotGuard<'a> {
    slot: &'a InFlightSlot,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.slot.lock().hand_off();
    }
}

impl InFlightSlot {
    fn lock(&self) -> MutexGuard<'_, SlotQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Waits until the slot is free or `deadline` passes.
    ///
    /// With no deadline the wait lasts until the slot is handed over.
    pub(crate) fn acquire(&self, deadline: Option<Instant>) -> Option<SlotGuard<'_>> {
        let (ticket, wake) = {
            let mut queue = self.lock();
            if !queue.busy && queue.waiters.is_empty() {
                queue.busy = true;
                return Some(SlotGuard { slot: self });
            }
            let ticket = queue.next_ticket;
            queue.next_ticket = queue.next_ticket.wrapping_add(1);
            let (sender, receiver) = mpsc::sync_channel(1);
            queue.waiters.push_back(Waiter {
                ticket,
                wake: sender,
            });
            (ticket, receiver)
        };

        let woken = deadline.map_or_else(
            || wake.recv().is_ok(),
            |limit| {
                wake.recv_timeout(limit.saturating_duration_since(Instant::now()))
                    .is_ok()
            },
        );
        if woken {
            Some(SlotGuard { slot: self })
        } else {
            self.abandon(ticket, &wake);
            None
        }
    }

    fn abandon(&self, ticket: u64, wake: &Receiver<()>) {
        let mut queue = self.lock();
        // A hand-off may have landed between the timeout and taking the lock.
        if wake.try_recv().is_ok() {
            queue.hand_off();
        } else {
            queue.waiters.retain(|waiter| waiter.ticket != ticket);
        }
    }

    #[cfg(test)]
    pub(crate) fn waiting(&self) -> usize {
        self.lock().waiters.len()
    }
}
