//! Typed decoding of server events.

use std::str::FromStr;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use strum::{Display, EnumString, IntoStaticStr};

use super::{DitherOffset, GuideParamChange, GuideStepStatus, Point, ServerVersion, StarLostStatus};
use crate::errors::ProtocolDecodeWarning;
use crate::protocol::EventMessage;

/// Names of the events the client understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display, IntoStaticStr)]
pub enum EventKind {
    /// Server version banner.
    Version,
    /// Lock position moved.
    LockPositionSet,
    /// Calibration step progress.
    Calibrating,
    /// Calibration finished successfully.
    CalibrationComplete,
    /// Guide star selected.
    StarSelected,
    /// Guiding started.
    StartGuiding,
    /// Guiding paused.
    Paused,
    /// Calibration started.
    StartCalibration,
    /// Application phase changed.
    AppState,
    /// Calibration failed.
    CalibrationFailed,
    /// Calibration data flipped.
    CalibrationDataFlipped,
    /// Lock position hit the frame edge.
    LockPositionShiftLimitReached,
    /// A looping exposure completed.
    LoopingExposures,
    /// Looping stopped.
    LoopingExposuresStopped,
    /// Settling started.
    SettleBegin,
    /// Settling progress.
    Settling,
    /// Settling finished.
    SettleDone,
    /// Guide star lost.
    StarLost,
    /// Guiding stopped.
    GuidingStopped,
    /// Guiding resumed after a pause.
    Resumed,
    /// Per-frame guiding telemetry.
    GuideStep,
    /// Dither applied.
    GuidingDithered,
    /// Lock position lost.
    LockPositionLost,
    /// Operator alert.
    Alert,
    /// Guiding parameter changed.
    GuideParamChange,
    /// Profile configuration changed.
    ConfigurationChange,
}

/// Progress of one calibration step.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CalibratingEvent {
    /// Mount being calibrated.
    #[serde(rename = "Mount")]
    pub mount: Option<String>,
    /// Direction being calibrated.
    #[serde(rename = "dir")]
    pub direction: Option<String>,
    /// Distance from the starting position.
    #[serde(rename = "dist")]
    pub distance: Option<f64>,
    /// Horizontal offset.
    pub dx: Option<f64>,
    /// Vertical offset.
    pub dy: Option<f64>,
    /// Star position as `[x, y]`.
    pub pos: Option<[f64; 2]>,
    /// Step number.
    pub step: Option<u32>,
    /// Server description of the step.
    #[serde(rename = "State")]
    pub state: Option<String>,
}

/// Settling progress.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SettlingEvent {
    /// Distance from the lock position.
    #[serde(rename = "Distance")]
    pub distance: Option<f64>,
    /// Seconds since settling began.
    #[serde(rename = "Time")]
    pub time: Option<f64>,
    /// Seconds the star must stay within tolerance.
    #[serde(rename = "SettleTime")]
    pub settle_time: Option<f64>,
    /// The star is locked.
    #[serde(rename = "StarLocked")]
    pub star_locked: bool,
}

/// Result of a settle.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SettleDoneEvent {
    /// Zero on success.
    #[serde(rename = "Status")]
    pub status: i64,
    /// Failure description.
    #[serde(rename = "Error")]
    pub error: Option<String>,
    /// Frames examined.
    #[serde(rename = "TotalFrames")]
    pub total_frames: Option<u64>,
    /// Frames dropped.
    #[serde(rename = "DroppedFrames")]
    pub dropped_frames: Option<u64>,
}

impl SettleDoneEvent {
    /// Whether the settle succeeded.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        self.status == 0
    }
}

/// Operator alert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AlertEvent {
    /// Alert text.
    #[serde(rename = "Msg")]
    pub message: String,
    /// Severity: `info`, `question`, `warning` or `error`.
    #[serde(rename = "Type")]
    pub kind: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct MountPayload {
    #[serde(rename = "Mount")]
    mount: Option<String>,
}

#[derive(Deserialize)]
struct AppStatePayload {
    #[serde(rename = "State")]
    state: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct ReasonPayload {
    #[serde(rename = "Reason")]
    reason: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct FramePayload {
    #[serde(rename = "Frame")]
    frame: Option<u64>,
}

/// A decoded server event.
#[derive(Debug, Clone, PartialEq)]
pub enum GuideEvent {
    /// Server version banner.
    Version(ServerVersion),
    /// Lock position moved.
    LockPositionSet(Point),
    /// Calibration step progress.
    Calibrating(CalibratingEvent),
    /// Calibration finished successfully.
    CalibrationComplete {
        /// Calibrated mount.
        mount: Option<String>,
    },
    /// Guide star selected.
    StarSelected(Point),
    /// Guiding started.
    StartGuiding,
    /// Guiding paused.
    Paused,
    /// Calibration started.
    StartCalibration {
        /// Mount being calibrated.
        mount: Option<String>,
    },
    /// Application phase changed; carries the raw phase name.
    AppState {
        /// Phase name as sent by the server.
        state: String,
    },
    /// Calibration failed.
    CalibrationFailed {
        /// Failure description.
        reason: Option<String>,
    },
    /// Calibration data flipped.
    CalibrationDataFlipped {
        /// Mount whose data was flipped.
        mount: Option<String>,
    },
    /// Lock position hit the frame edge.
    LockPositionShiftLimitReached,
    /// A looping exposure completed.
    LoopingExposures {
        /// Frame number.
        frame: Option<u64>,
    },
    /// Looping stopped.
    LoopingExposuresStopped,
    /// Settling started.
    SettleBegin,
    /// Settling progress.
    Settling(SettlingEvent),
    /// Settling finished.
    SettleDone(SettleDoneEvent),
    /// Guide star lost.
    StarLost(StarLostStatus),
    /// Guiding stopped.
    GuidingStopped,
    /// Guiding resumed after a pause.
    Resumed,
    /// Per-frame guiding telemetry.
    GuideStep(GuideStepStatus),
    /// Dither applied.
    GuidingDithered(DitherOffset),
    /// Lock position lost.
    LockPositionLost,
    /// Operator alert.
    Alert(AlertEvent),
    /// Guiding parameter changed.
    GuideParamChange(GuideParamChange),
    /// Profile configuration changed.
    ConfigurationChange,
}

fn payload<T: DeserializeOwned>(kind: EventKind, body: Value) -> Result<T, ProtocolDecodeWarning> {
    serde_json::from_value(body).map_err(|source| ProtocolDecodeWarning::EventPayload {
        event: kind.to_string(),
        source,
    })
}

impl GuideEvent {
    /// Decodes an event message into its typed form.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolDecodeWarning::UnknownEvent`] for names outside
    /// [`EventKind`] and [`ProtocolDecodeWarning::EventPayload`] when the
    /// fields do not have the expected types.
    pub fn decode(message: EventMessage) -> Result<Self, ProtocolDecodeWarning> {
        let kind = EventKind::from_str(&message.name)
            .map_err(|_| ProtocolDecodeWarning::UnknownEvent(message.name))?;
        let body = Value::Object(message.body);
        let event = match kind {
            EventKind::Version => Self::Version(payload(kind, body)?),
            EventKind::LockPositionSet => Self::LockPositionSet(payload(kind, body)?),
            EventKind::Calibrating => Self::Calibrating(payload(kind, body)?),
            EventKind::CalibrationComplete => {
                let MountPayload { mount } = payload(kind, body)?;
                Self::CalibrationComplete { mount }
            }
            EventKind::StarSelected => Self::StarSelected(payload(kind, body)?),
            EventKind::StartGuiding => Self::StartGuiding,
            EventKind::Paused => Self::Paused,
            EventKind::StartCalibration => {
                let MountPayload { mount } = payload(kind, body)?;
                Self::StartCalibration { mount }
            }
            EventKind::AppState => {
                let AppStatePayload { state } = payload(kind, body)?;
                Self::AppState { state }
            }
            EventKind::CalibrationFailed => {
                let ReasonPayload { reason } = payload(kind, body)?;
                Self::CalibrationFailed { reason }
            }
            EventKind::CalibrationDataFlipped => {
                let MountPayload { mount } = payload(kind, body)?;
                Self::CalibrationDataFlipped { mount }
            }
            EventKind::LockPositionShiftLimitReached => Self::LockPositionShiftLimitReached,
            EventKind::LoopingExposures => {
                let FramePayload { frame } = payload(kind, body)?;
                Self::LoopingExposures { frame }
            }
            EventKind::LoopingExposuresStopped => Self::LoopingExposuresStopped,
            EventKind::SettleBegin => Self::SettleBegin,
            EventKind::Settling => Self::Settling(payload(kind, body)?),
            EventKind::SettleDone => Self::SettleDone(payload(kind, body)?),
            EventKind::StarLost => Self::StarLost(payload(kind, body)?),
            EventKind::GuidingStopped => Self::GuidingStopped,
            EventKind::Resumed => Self::Resumed,
            EventKind::GuideStep => Self::GuideStep(payload(kind, body)?),
            EventKind::GuidingDithered => Self::GuidingDithered(payload(kind, body)?),
            EventKind::LockPositionLost => Self::LockPositionLost,
            EventKind::Alert => Self::Alert(payload(kind, body)?),
            EventKind::GuideParamChange => Self::GuideParamChange(payload(kind, body)?),
            EventKind::ConfigurationChange => Self::ConfigurationChange,
        };
        Ok(event)
    }

    /// The event's name.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Version(_) => EventKind::Version,
            Self::LockPositionSet(_) => EventKind::LockPositionSet,
            Self::Calibrating(_) => EventKind::Calibrating,
            Self::CalibrationComplete { .. } => EventKind::CalibrationComplete,
            Self::StarSelected(_) => EventKind::StarSelected,
            Self::StartGuiding => EventKind::StartGuiding,
            Self::Paused => EventKind::Paused,
            Self::StartCalibration { .. } => EventKind::StartCalibration,
            Self::AppState { .. } => EventKind::AppState,
            Self::CalibrationFailed { .. } => EventKind::CalibrationFailed,
            Self::CalibrationDataFlipped { .. } => EventKind::CalibrationDataFlipped,
            Self::LockPositionShiftLimitReached => EventKind::LockPositionShiftLimitReached,
            Self::LoopingExposures { .. } => EventKind::LoopingExposures,
            Self::LoopingExposuresStopped => EventKind::LoopingExposuresStopped,
            Self::SettleBegin => EventKind::SettleBegin,
            Self::Settling(_) => EventKind::Settling,
            Self::SettleDone(_) => EventKind::SettleDone,
            Self::StarLost(_) => EventKind::StarLost,
            Self::GuidingStopped => EventKind::GuidingStopped,
            Self::Resumed => EventKind::Resumed,
            Self::GuideStep(_) => EventKind::GuideStep,
            Self::GuidingDithered(_) => EventKind::GuidingDithered,
            Self::LockPositionLost => EventKind::LockPositionLost,
            Self::Alert(_) => EventKind::Alert,
            Self::GuideParamChange(_) => EventKind::GuideParamChange,
            Self::ConfigurationChange => EventKind::ConfigurationChange,
        }
    }
}
