//! Session lifecycle: one client, at most one live connection.
//!
//! A [`Session`] owns the guiding state for its whole lifetime and swaps the
//! underlying connection on [`Session::reconnect`]. Each connection bundles
//! the transport, a correlator with fresh request ids and the dispatcher
//! thread reading the socket.
//!
//! Opening and closing connections is serialised by a lifecycle lock that
//! command calls never take, so a slow connect cannot stall a caller.


use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use phd2_config::{Config, SocketEndpoint};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::correlator::Correlator;
use crate::dispatch;
use crate::errors::{CommandError, ConnectError};
use crate::state::{GuidingState, StateStore, Subscription};
use crate::transport::{ShutdownHandle, Transport, TransportWriter};

pub(crate) const SESSION_TARGET: &str = "phd2_client::session";

struct Connection {
    correlator: Arc<Correlator<TransportWriter>>,
    shutdown: ShutdownHandle,
    dispatcher: Option<JoinHandle<()>>,
}

impl Connection {
    fn open(
        endpoint: &SocketEndpoint,
        timeout: Duration,
        store: &Arc<StateStore>,
    ) -> Result<Self, ConnectError> {
        let (reader, writer, shutdown) = Transport::connect(endpoint, timeout)?.into_parts();
        let correlator = Arc::new(Correlator::new(writer));
        let dispatcher = dispatch::spawn(reader, Arc::clone(&correlator), Arc::clone(store))
            .map_err(|source| {
                shutdown.close();
                ConnectError::Spawn {
                    endpoint: endpoint.to_string(),
                    source,
                }
            })?;
        Ok(Self {
            correlator,
            shutdown,
            dispatcher: Some(dispatcher),
        })
    }

    /// Closes the socket and waits for the dispatcher to drain.
    fn close(mut self) {
        self.shutdown.close();
        if let Some(dispatcher) = self.dispatcher.take() {
            if dispatcher.join().is_err() {
                warn!(target: SESSION_TARGET, "dispatcher thread panicked");
            }
        }
    }
}

/// Handle on a conversation with one guiding server.
///
/// All methods take `&self`; a session can be shared across threads behind
/// an [`Arc`] and commands issued concurrently are serialised onto the wire.
pub struct Session {
    endpoint: SocketEndpoint,
    connect_timeout: Duration,
    command_timeout: Duration,
    store: Arc<StateStore>,
    lifecycle: Mutex<()>,
    connection: Mutex<Option<Connection>>,
}

impl Session {
    /// Creates a disconnected session for the configured endpoint.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            endpoint: config.endpoint().clone(),
            connect_timeout: config.connect_timeout(),
            command_timeout: config.command_timeout(),
            store: Arc::new(StateStore::default()),
            lifecycle: Mutex::new(()),
            connection: Mutex::new(None),
        }
    }

    /// Creates a session and opens its first connection.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError`] when the server cannot be reached.
    pub fn connect(config: &Config) -> Result<Self, ConnectError> {
        let session = Self::new(config);
        session.reconnect()?;
        Ok(session)
    }

    fn lifecycle(&self) -> MutexGuard<'_, ()> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Guards only the installed connection; never held across I/O.
    fn connection(&self) -> MutexGuard<'_, Option<Connection>> {
        self.connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Tears down any existing connection, then opens a new one.
    ///
    /// The previous dispatcher has fully stopped before the new socket is
    /// opened, and request ids restart at 1.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError`] when the server cannot be reached; the
    /// session is left disconnected. Commands issued meanwhile fail with
    /// [`CommandError::NotConnected`].
    pub fn reconnect(&self) -> Result<(), ConnectError> {
        let _lifecycle = self.lifecycle();
        let previous = self.connection().take();
        if let Some(connection) = previous {
            debug!(target: SESSION_TARGET, endpoint = %self.endpoint, "closing previous connection");
            connection.close();
        }
        let connection = Connection::open(&self.endpoint, self.connect_timeout, &self.store)
            .inspect_err(|error| {
                warn!(target: SESSION_TARGET, endpoint = %self.endpoint, %error, "connect failed");
            })?;
        *self.connection() = Some(connection);
        info!(
            target: SESSION_TARGET,
            endpoint = %self.endpoint,
            instance = ?self.endpoint.instance_number(),
            "connected to guiding server"
        );
        Ok(())
    }

    /// Closes the connection. Calling this while disconnected does nothing.
    pub fn disconnect(&self) {
        let _lifecycle = self.lifecycle();
        let previous = self.connection().take();
        if let Some(connection) = previous {
            connection.close();
            info!(target: SESSION_TARGET, endpoint = %self.endpoint, "disconnected from guiding server");
        }
    }

    /// Whether the server connection is currently up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.store.snapshot().connection.server_connected
    }

    /// Endpoint this session connects to.
    #[must_use]
    pub const fn endpoint(&self) -> &SocketEndpoint {
        &self.endpoint
    }

    /// Default timeout applied by the typed command methods.
    #[must_use]
    pub const fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    /// Sends an arbitrary command and waits for its result.
    ///
    /// Scalar `params` are sent as a one-element array. Concurrent calls are
    /// queued in arrival order; `timeout` covers both the queueing and the
    /// round trip.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError`] when the session is disconnected, the server
    /// rejects the command, the connection drops, or `timeout` elapses.
    pub fn call(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value, CommandError> {
        let correlator = self
            .connection()
            .as_ref()
            .map(|connection| Arc::clone(&connection.correlator))
            .ok_or_else(|| CommandError::NotConnected {
                method: method.to_owned(),
            })?;
        correlator.call(method, params, timeout)
    }

    /// Current guiding state. Never blocks on the dispatcher.
    #[must_use]
    pub fn snapshot(&self) -> Arc<GuidingState> {
        self.store.snapshot()
    }

    /// Receives a snapshot after every state change from now on.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        self.store.subscribe()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.disconnect();
    }
}
