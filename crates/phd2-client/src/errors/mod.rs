//! Error types shared by the protocol layers.
//!
//! Each layer owns one enum: establishing a connection ([`ConnectError`]),
//! moving bytes ([`TransportError`]), decoding inbound lines
//! ([`ProtocolDecodeWarning`]) and completing a command round trip
//! ([`CommandError`]).

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while opening a connection to the guiding server.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The host name could not be resolved.
    #[error("failed to resolve {endpoint}: {source}")]
    Resolve {
        /// Endpoint being connected to.
        endpoint: String,
        /// Resolver failure.
        #[source]
        source: io::Error,
    },
    /// The server refused the connection or the socket failed.
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        /// Endpoint being connected to.
        endpoint: String,
        /// Underlying socket error.
        #[source]
        source: io::Error,
    },
    /// The connect attempt exceeded its deadline.
    #[error("timed out connecting to {endpoint} after {timeout:?}")]
    Timeout {
        /// Endpoint being connected to.
        endpoint: String,
        /// Deadline that elapsed.
        timeout: Duration,
    },
    /// Unix sockets are unavailable on this platform.
    #[error("unix sockets are unsupported for endpoint {endpoint}")]
    UnsupportedUnix {
        /// Endpoint being connected to.
        endpoint: String,
    },
    /// The reader thread could not be started.
    #[error("failed to start dispatcher for {endpoint}: {source}")]
    Spawn {
        /// Endpoint being connected to.
        endpoint: String,
        /// Thread spawn failure.
        #[source]
        source: io::Error,
    },
}

/// Errors raised while reading or writing protocol lines.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The socket failed.
    #[error("transport I/O error: {0}")]
    Io(#[from] io::Error),
    /// The connection was closed locally or by the peer.
    #[error("connection closed")]
    Closed,
}

/// Non-fatal problems with an inbound line.
///
/// The dispatcher logs these and moves on to the next line.
#[derive(Debug, Error)]
pub enum ProtocolDecodeWarning {
    /// The line is not valid JSON.
    #[error("line is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    /// The line is valid JSON but not an object.
    #[error("line is not a JSON object")]
    NotAnObject,
    /// The object is neither a response nor an event.
    #[error("message is neither a response nor an event: {0}")]
    Unrecognised(String),
    /// The event name is not one the client understands.
    #[error("unknown event '{0}'")]
    UnknownEvent(String),
    /// The event fields do not have the expected types.
    #[error("malformed {event} event: {source}")]
    EventPayload {
        /// Event name.
        event: String,
        /// Decoder failure.
        #[source]
        source: serde_json::Error,
    },
}

/// Errors surfaced to the caller of a command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// No response arrived within the call timeout.
    #[error("{method} timed out after {timeout:?}")]
    Timeout {
        /// Command method name.
        method: String,
        /// Timeout that elapsed.
        timeout: Duration,
    },
    /// The server answered with an error object.
    #[error("{method} failed with code {code}: {message}")]
    Remote {
        /// Command method name.
        method: String,
        /// Server error code.
        code: i64,
        /// Server error message.
        message: String,
    },
    /// The connection dropped before the response arrived.
    #[error("connection lost while waiting for {method}")]
    ConnectionLost {
        /// Command method name.
        method: String,
    },
    /// No connection is open.
    #[error("cannot send {method}: not connected")]
    NotConnected {
        /// Command method name.
        method: String,
    },
    /// The request could not be serialised.
    #[error("failed to encode {method}: {source}")]
    Encode {
        /// Command method name.
        method: String,
        /// Serialiser failure.
        #[source]
        source: serde_json::Error,
    },
    /// The request line could not be written.
    #[error("failed to send {method}: {source}")]
    Transport {
        /// Command method name.
        method: String,
        /// Write failure.
        #[source]
        source: TransportError,
    },
}

impl CommandError {
    /// Method name of the command that failed.
    #[must_use]
    pub fn method(&self) -> &str {
        match self {
            Self::Timeout { method, .. }
            | Self::Remote { method, .. }
            | Self::ConnectionLost { method }
            | Self::NotConnected { method }
            | Self::Encode { method, .. }
            | Self::Transport { method, .. } => method,
        }
    }
}
