use std::ops::RangeInclusive;
use std::time::Duration;

use crate::logging::LogFormat;
use crate::socket::SocketEndpoint;

/// Host PHD2 listens on when started locally.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Port of the first PHD2 instance.
pub const DEFAULT_PORT: u16 = 4400;

/// Ports probed when looking for running PHD2 instances.
pub const DEFAULT_DISCOVERY_PORTS: RangeInclusive<u16> = 4400..=4406;

/// Bound on establishing the TCP or Unix connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Bound on a single command round trip.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Bound on each discovery probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(250);

/// Default log filter expression.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default log filter expression.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Default logging format.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Compact
}

/// Endpoint of the first PHD2 instance on the local machine.
#[must_use]
pub fn default_endpoint() -> SocketEndpoint {
    SocketEndpoint::tcp(DEFAULT_HOST, DEFAULT_PORT)
}
