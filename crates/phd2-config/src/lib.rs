//! Shared configuration for the PHD2 guiding client.
//!
//! The crate describes where the guiding server lives, how long the client is
//! prepared to wait for it, and how logs are emitted. Values are layered
//! from files, `PHD2_*` environment variables and flags through
//! `ortho_config`. The crate performs no socket I/O; `phd2-client` consumes
//! the values.

mod config;
mod defaults;
mod logging;
mod socket;

pub use config::{Config, ConfigError};
pub use defaults::{
    DEFAULT_COMMAND_TIMEOUT, DEFAULT_CONNECT_TIMEOUT, DEFAULT_DISCOVERY_PORTS, DEFAULT_HOST,
    DEFAULT_LOG_FILTER, DEFAULT_PORT, DEFAULT_PROBE_TIMEOUT, default_endpoint, default_log_filter,
    default_log_format,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use socket::{SocketEndpoint, SocketParseError};
