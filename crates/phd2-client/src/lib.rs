//! Client engine for the PHD2 guiding server's line-delimited JSON protocol.
//!
//! A [`Session`] owns one connection at a time. Behind it a dispatcher
//! thread reads the socket and routes every line: responses go to the
//! correlator, which keeps exactly one request on the wire and wakes the
//! waiting caller, while asynchronous events are folded into an immutable
//! [`GuidingState`] snapshot by a pure [`reduce`] function.
//!
//! Callers either use [`Session::call`] for raw method invocations or the
//! typed wrappers in the command set (`Session::guide`, `Session::dither`,
//! `Session::get_exposure` and friends), which validate arguments before
//! sending and map server rejections to [`GuiderError`].
//!
//! Nothing here retries. A lost connection leaves the session disconnected
//! until [`Session::reconnect`] is called.
//!
//! All diagnostics go through `tracing` under `phd2_client::*` targets;
//! [`telemetry::initialise`] installs a subscriber for hosts that do not
//! bring their own.

mod commands;
mod correlator;
pub mod discovery;
mod dispatch;
mod errors;
mod protocol;
mod session;
mod state;
pub mod telemetry;
mod transport;

pub use commands::{
    CalibrationData, CalibrationTarget, ClearCalibrationTarget, FrameSize, GuiderError,
    MIN_STAR_IMAGE_SIZE, Roi, SettleParams, StarImage,
};
pub use discovery::{DiscoveryError, discover, scan_ports};
pub use errors::{CommandError, ConnectError, ProtocolDecodeWarning, TransportError};
pub use phd2_config::{Config, ConfigError, LogFormat, SocketEndpoint};
pub use protocol::{CommandRequest, EventMessage, InboundMessage, RemoteError, ResponseMessage};
pub use session::Session;
pub use state::{
    AlertEvent, AppPhase, CalibratingEvent, CalibrationStatus, ConnectionState, CoolerStatus,
    DeviceInfo, DitherOffset, EquipmentSnapshot, EventKind, GuideEvent, GuideParamChange,
    GuideStepStatus, GuidingState, LoopingStatus, Point, Profile, ServerVersion, SettleDoneEvent,
    SettleStatus, SettlingEvent, StarLostStatus, StarStatus, Subscription, reduce,
};
pub use telemetry::{TelemetryError, TelemetryHandle};
pub use transport::{
    LINE_TERMINATOR, LineSink, LineSource, ShutdownHandle, Transport, TransportReader,
    TransportWriter,
};

#[cfg(test)]
mod tests;
