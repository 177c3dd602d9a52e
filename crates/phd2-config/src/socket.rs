//! Where a PHD2 guiding server can be reached.
//!
//! PHD2 serves its event protocol on TCP; instance `n` listens on port
//! `4400 + n - 1`. Builds with a Unix socket server are also supported.
//! Endpoints are written as `tcp://host:port` or `unix:///path`, and
//! configuration files may use either that text or the tagged table form.

use std::fmt;
use std::str::FromStr;

use camino::Utf8PathBuf;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::defaults::DEFAULT_PORT;

/// Transport and address of a guiding server.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "transport", rename_all = "snake_case")]
pub enum SocketEndpoint {
    /// Unix domain socket endpoint.
    Unix {
        /// Filesystem path of the socket.
        path: Utf8PathBuf,
    },
    /// TCP socket endpoint.
    Tcp {
        /// Host name or address literal.
        host: String,
        /// TCP port.
        port: u16,
    },
}

impl SocketEndpoint {
    /// Builds a Unix domain socket endpoint.
    #[must_use]
    pub fn unix(path: impl Into<Utf8PathBuf>) -> Self {
        Self::Unix { path: path.into() }
    }

    /// Builds a TCP socket endpoint.
    #[must_use]
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Returns the host and port when the endpoint uses TCP.
    #[must_use]
    pub fn tcp_address(&self) -> Option<(&str, u16)> {
        match self {
            Self::Tcp { host, port } => Some((host.as_str(), *port)),
            Self::Unix { .. } => None,
        }
    }

    /// PHD2 instance number served on this endpoint's TCP port.
    ///
    /// Ports below the first instance port, and Unix endpoints, have none.
    #[must_use]
    pub fn instance_number(&self) -> Option<u16> {
        self.tcp_address()
            .and_then(|(_, port)| port.checked_sub(DEFAULT_PORT))
            .and_then(|offset| offset.checked_add(1))
    }
}

impl fmt::Display for SocketEndpoint {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix { path } => write!(formatter, "unix://{path}"),
            Self::Tcp { host, port } => write!(formatter, "tcp://{host}:{port}"),
        }
    }
}

impl FromStr for SocketEndpoint {
    type Err = SocketParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(input)?;
        match url.scheme() {
            "tcp" => {
                let host = url
                    .host_str()
                    .ok_or_else(|| SocketParseError::MissingHost(input.to_owned()))?;
                let port = url
                    .port()
                    .ok_or_else(|| SocketParseError::MissingPort(input.to_owned()))?;
                Ok(Self::tcp(host, port))
            }
            "unix" => match url.path() {
                "" | "/" => Err(SocketParseError::MissingUnixPath(input.to_owned())),
                path => Ok(Self::unix(path)),
            },
            other => Err(SocketParseError::UnsupportedScheme(other.to_owned())),
        }
    }
}

#[derive(Deserialize)]
#[serde(tag = "transport", rename_all = "snake_case")]
enum TaggedEndpoint {
    Unix { path: Utf8PathBuf },
    Tcp { host: String, port: u16 },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EndpointForm {
    Text(String),
    Tagged(TaggedEndpoint),
}

impl<'de> Deserialize<'de> for SocketEndpoint {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match EndpointForm::deserialize(deserializer)? {
            EndpointForm::Text(text) => text.parse().map_err(de::Error::custom),
            EndpointForm::Tagged(TaggedEndpoint::Unix { path }) => Ok(Self::Unix { path }),
            EndpointForm::Tagged(TaggedEndpoint::Tcp { host, port }) => {
                Ok(Self::Tcp { host, port })
            }
        }
    }
}

/// Errors encountered while parsing a [`SocketEndpoint`] from text.
#[derive(Debug, Error)]
pub enum SocketParseError {
    /// Scheme was neither `tcp` nor `unix`.
    #[error("unsupported endpoint scheme '{0}', expected tcp or unix")]
    UnsupportedScheme(String),
    /// TCP host name was missing.
    #[error("missing host in '{0}'")]
    MissingHost(String),
    /// TCP port was missing; PHD2 has no implicit port.
    #[error("missing port in '{0}'")]
    MissingPort(String),
    /// Unix socket path was absent.
    #[error("missing Unix socket path in '{0}'")]
    MissingUnixPath(String),
    /// Text was not a URL.
    #[error(transparent)]
    Url(#[from] url::ParseError),
}
