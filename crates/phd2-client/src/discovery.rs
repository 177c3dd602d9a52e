//! Locating running guiding servers by probing TCP ports.
//!
//! A port counts as live when a TCP connect succeeds; no protocol exchange
//! takes place and the probe socket is closed immediately.

use std::net::{SocketAddr, TcpStream};
use std::ops::RangeInclusive;
use std::time::Duration;

use phd2_config::Config;
use thiserror::Error;
use tracing::{debug, info, trace};

use crate::transport::resolve_tcp_address;

pub(crate) const DISCOVERY_TARGET: &str = "phd2_client::discovery";

/// Failure to run a port scan.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The range starts after it ends.
    #[error("invalid port range {start}..={end}")]
    InvalidRange {
        /// First port of the range.
        start: u16,
        /// Last port of the range.
        end: u16,
    },
    /// The host name did not resolve.
    #[error("failed to resolve {host}: {source}")]
    Resolve {
        /// Host that was looked up.
        host: String,
        /// Resolver failure.
        #[source]
        source: std::io::Error,
    },
}

/// Returns the ports in `ports` on which `host` accepts TCP connections.
///
/// Ports are probed one at a time, each bounded by `probe_timeout`, and
/// reported in ascending order.
///
/// # Errors
///
/// Returns [`DiscoveryError::InvalidRange`] for an inverted range and
/// [`DiscoveryError::Resolve`] when `host` cannot be resolved.
pub fn scan_ports(
    host: &str,
    ports: RangeInclusive<u16>,
    probe_timeout: Duration,
) -> Result<Vec<u16>, DiscoveryError> {
    let (start, end) = (*ports.start(), *ports.end());
    if start > end {
        return Err(DiscoveryError::InvalidRange { start, end });
    }
    let base = resolve_tcp_address(host, start).map_err(|source| DiscoveryError::Resolve {
        host: host.to_owned(),
        source,
    })?;

    let open: Vec<u16> = ports
        .filter(|port| probe(SocketAddr::new(base.ip(), *port), probe_timeout))
        .collect();
    info!(target: DISCOVERY_TARGET, host, start, end, found = open.len(), "port scan finished");
    Ok(open)
}

/// Scans the configured discovery range on the configured TCP host.
///
/// Unix endpoints have nothing to scan and yield an empty list.
///
/// # Errors
///
/// See [`scan_ports`].
pub fn discover(config: &Config) -> Result<Vec<u16>, DiscoveryError> {
    config.endpoint().tcp_address().map_or_else(
        || {
            debug!(target: DISCOVERY_TARGET, endpoint = %config.endpoint(), "skipping discovery for non-TCP endpoint");
            Ok(Vec::new())
        },
        |(host, _)| scan_ports(host, config.discovery_ports(), config.probe_timeout()),
    )
}

fn probe(addr: SocketAddr, timeout: Duration) -> bool {
    TcpStream::connect_timeout(&addr, timeout)
        .inspect(|_| debug!(target: DISCOVERY_TARGET, %addr, "listener found"))
        .inspect_err(|error| trace!(target: DISCOVERY_TARGET, %addr, %error, "no listener"))
        .is_ok()
}
