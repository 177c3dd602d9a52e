//! Matches outbound commands to their responses.
//!
//! The protocol allows a single outstanding request. [`Correlator::call`]
//! takes the in-flight slot, registers a pending entry, writes the request,
//! then waits on a rendezvous channel that only the dispatcher fills through
//! [`Correlator::resolve`] or [`Correlator::fail_all`].

mod slot;


use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::errors::{CommandError, TransportError};
use crate::protocol::{CommandRequest, ResponseMessage};
use crate::transport::LineSink;

use slot::InFlightSlot;

pub(crate) const CORRELATOR_TARGET: &str = "phd2_client::correlator";

type Reply = Result<Value, CommandError>;

struct Pending {
    id: u64,
    method: String,
    params: Option<Value>,
    reply: SyncSender<Reply>,
}

#[derive(Default)]
struct PendingState {
    closed: bool,
    current: Option<Pending>,
}

/// Call/await interface over a single-outstanding-request stream.
pub(crate) struct Correlator<S> {
    sink: Mutex<S>,
    slot: InFlightSlot,
    pending: Mutex<PendingState>,
    next_id: AtomicU64,
}

impl<S: LineSink> Correlator<S> {
    pub(crate) fn new(sink: S) -> Self {
        Self {
            sink: Mutex::new(sink),
            slot: InFlightSlot::default(),
            pending: Mutex::new(PendingState::default()),
            next_id: AtomicU64::new(1),
        }
    }

    fn pending(&self) -> MutexGuard<'_, PendingState> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sends `method` and blocks until its response, a disconnect, or
    /// `timeout`.
    ///
    /// The timeout covers both waiting for the slot and waiting for the reply.
    /// A timeout too large to express as a deadline waits without bound.
    pub(crate) fn call(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value, CommandError> {
        let deadline = Instant::now().checked_add(timeout);
        let timed_out = || CommandError::Timeout {
            method: method.to_owned(),
            timeout,
        };
        let Some(_slot) = self.slot.acquire(deadline) else {
            debug!(target: CORRELATOR_TARGET, method, "timed out waiting for in-flight slot");
            return Err(timed_out());
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = CommandRequest::new(method, id, params);
        let line = request.encode().map_err(|source| CommandError::Encode {
            method: method.to_owned(),
            source,
        })?;
        let (reply, receiver) = mpsc::sync_channel(1);
        {
            let mut state = self.pending();
            if state.closed {
                return Err(CommandError::ConnectionLost {
                    method: method.to_owned(),
                });
            }
            state.current = Some(Pending {
                id,
                method: method.to_owned(),
                params: request.params.clone(),
                reply,
            });
        }

        debug!(target: CORRELATOR_TARGET, method, id, "sending command");
        let sent = self
            .sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .send_line(&line);
        if let Err(error) = sent {
            self.forget(id);
            return Err(match error {
                TransportError::Closed => CommandError::ConnectionLost {
                    method: method.to_owned(),
                },
                TransportError::Io(_) => CommandError::Transport {
                    method: method.to_owned(),
                    source: error,
                },
            });
        }

        match wait_for_reply(&receiver, deadline) {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Timeout) => {
                self.forget(id);
                // The dispatcher replies while holding the pending lock, so a
                // resolution that raced the timeout is already in the channel.
                receiver.try_recv().unwrap_or_else(|_| {
                    warn!(target: CORRELATOR_TARGET, method, id, ?timeout, "command timed out");
                    Err(timed_out())
                })
            }
            Err(RecvTimeoutError::Disconnected) => Err(CommandError::ConnectionLost {
                method: method.to_owned(),
            }),
        }
    }

    fn forget(&self, id: u64) {
        let mut state = self.pending();
        if state.current.as_ref().is_some_and(|pending| pending.id == id) {
            state.current = None;
        }
    }

    /// Completes the in-flight call with `response`.
    ///
    /// `on_success` runs before the caller is woken, with the method name,
    /// the encoded parameters and the result. Responses with no call in
    /// flight, or whose id names an earlier call, are discarded.
    pub(crate) fn resolve<F>(&self, response: ResponseMessage, on_success: F)
    where
        F: FnOnce(&str, Option<&Value>, &Value),
    {
        let mut state = self.pending();
        let Some(pending) = state.current.take() else {
            warn!(
                target: CORRELATOR_TARGET,
                id = ?response.id,
                "discarding response with no command in flight"
            );
            return;
        };
        if let Some(id) = response.id.filter(|id| *id != pending.id) {
            warn!(
                target: CORRELATOR_TARGET,
                id,
                expected = pending.id,
                method = %pending.method,
                "discarding stale response"
            );
            state.current = Some(pending);
            return;
        }

        let outcome = response
            .outcome
            .map(|result| {
                debug!(target: CORRELATOR_TARGET, method = %pending.method, id = pending.id, "command succeeded");
                on_success(&pending.method, pending.params.as_ref(), &result);
                result
            })
            .map_err(|remote| {
                debug!(
                    target: CORRELATOR_TARGET,
                    method = %pending.method,
                    id = pending.id,
                    code = remote.code,
                    message = %remote.message,
                    "command rejected"
                );
                CommandError::Remote {
                    method: pending.method.clone(),
                    code: remote.code,
                    message: remote.message,
                }
            });
        if pending.reply.send(outcome).is_err() {
            trace!(target: CORRELATOR_TARGET, id = pending.id, "caller no longer waiting");
        }
    }

    /// Fails the in-flight call with [`CommandError::ConnectionLost`] and
    /// rejects every later call.
    pub(crate) fn fail_all(&self) {
        let mut state = self.pending();
        state.closed = true;
        if let Some(pending) = state.current.take() {
            debug!(
                target: CORRELATOR_TARGET,
                method = %pending.method,
                id = pending.id,
                "failing in-flight command"
            );
            let lost = CommandError::ConnectionLost {
                method: pending.method,
            };
            if pending.reply.send(Err(lost)).is_err() {
                trace!(target: CORRELATOR_TARGET, "caller no longer waiting");
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn in_flight_id(&self) -> Option<u64> {
        self.pending().current.as_ref().map(|pending| pending.id)
    }
}

fn wait_for_reply(
    receiver: &Receiver<Reply>,
    deadline: Option<Instant>,
) -> Result<Reply, RecvTimeoutError> {
    deadline.map_or_else(
        || receiver.recv().map_err(|_| RecvTimeoutError::Disconnected),
        |limit| receiver.recv_timeout(limit.saturating_duration_since(Instant::now())),
    )
}
