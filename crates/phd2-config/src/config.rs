//! Aggregated configuration consumed by the guiding client.
//!
//! Values are layered by `ortho_config`: built-in defaults, then a
//! `.phd2.toml` file (or `--config-path`), then `PHD2_*` environment
//! variables such as `PHD2_ENDPOINT` or `PHD2_COMMAND_TIMEOUT_MS`, then
//! command-line flags. [`Config::validate`] runs on the merged result.

use std::ffi::OsString;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use ortho_config::{OrthoConfig, OrthoError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::defaults::{
    DEFAULT_COMMAND_TIMEOUT, DEFAULT_CONNECT_TIMEOUT, DEFAULT_DISCOVERY_PORTS,
    DEFAULT_PROBE_TIMEOUT, default_endpoint, default_log_filter, default_log_format,
};
use crate::logging::LogFormat;
use crate::socket::SocketEndpoint;

/// Program name placed ahead of the arguments handed to the loader.
const PROGRAM_NAME: &str = "phd2-client";

/// Client configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, OrthoConfig)]
#[serde(default)]
#[ortho_config(prefix = "PHD2")]
pub struct Config {
    /// Where the guiding server listens.
    pub endpoint: SocketEndpoint,
    /// Bound on establishing the connection, in milliseconds.
    pub connect_timeout_ms: u64,
    /// Bound on a single command round trip, in milliseconds.
    pub command_timeout_ms: u64,
    /// First port probed by discovery.
    pub discovery_start: u16,
    /// Last port probed by discovery (inclusive).
    pub discovery_end: u16,
    /// Per-port discovery probe timeout, in milliseconds.
    pub probe_timeout_ms: u64,
    /// `tracing` filter expression.
    pub log_filter: String,
    /// Log output format.
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            connect_timeout_ms: millis(DEFAULT_CONNECT_TIMEOUT),
            command_timeout_ms: millis(DEFAULT_COMMAND_TIMEOUT),
            discovery_start: *DEFAULT_DISCOVERY_PORTS.start(),
            discovery_end: *DEFAULT_DISCOVERY_PORTS.end(),
            probe_timeout_ms: millis(DEFAULT_PROBE_TIMEOUT),
            log_filter: default_log_filter().to_owned(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Loads configuration files and `PHD2_*` environment variables over the
    /// defaults, with no command-line flags.
    ///
    /// # Errors
    ///
    /// See [`Config::from_args`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_args([OsString::from(PROGRAM_NAME)])
    }

    /// Loads configuration with `args` as the command line.
    ///
    /// The first argument is the program name. Flags take precedence over
    /// the environment, which takes precedence over configuration files.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Load`] when a layer cannot be read or parsed,
    /// and propagates [`Config::validate`] failures.
    pub fn from_args<I>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = OsString>,
    {
        let config = Self::load_from_iter(args)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks invariants that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroTimeout`] or [`ConfigError::DiscoveryRange`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("connect_timeout_ms", self.connect_timeout_ms),
            ("command_timeout_ms", self.command_timeout_ms),
            ("probe_timeout_ms", self.probe_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroTimeout { name });
            }
        }
        if self.discovery_start > self.discovery_end {
            return Err(ConfigError::DiscoveryRange {
                start: self.discovery_start,
                end: self.discovery_end,
            });
        }
        Ok(())
    }

    /// Server endpoint.
    #[must_use]
    pub const fn endpoint(&self) -> &SocketEndpoint {
        &self.endpoint
    }

    /// Connect timeout.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Default per-command timeout.
    #[must_use]
    pub const fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    /// Ports probed by discovery.
    #[must_use]
    pub const fn discovery_ports(&self) -> RangeInclusive<u16> {
        self.discovery_start..=self.discovery_end
    }

    /// Per-port discovery probe timeout.
    #[must_use]
    pub const fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Errors raised while assembling a [`Config`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A configuration layer could not be read or parsed.
    #[error("failed to load configuration: {source}")]
    Load {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// A timeout was configured as zero.
    #[error("{name} must be greater than zero")]
    ZeroTimeout {
        /// Name of the offending field.
        name: &'static str,
    },
    /// The discovery range is inverted.
    #[error("discovery range {start}..={end} is empty")]
    DiscoveryRange {
        /// First port.
        start: u16,
        /// Last port.
        end: u16,
    },
}

impl From<Arc<OrthoError>> for ConfigError {
    fn from(source: Arc<OrthoError>) -> Self {
        Self::Load { source }
    }
}
