//! Guiding state snapshot and the machinery that keeps it current.
//!
//! [`GuidingState`] aggregates everything the server has told the client:
//! connection flags, application phase, calibration progress, the latest
//! guide step, settling, equipment and a handful of cached command results.
//! The dispatcher folds events into it with [`reduce`] and publishes each new
//! snapshot through a [`StateStore`]; readers only ever see immutable
//! [`Arc`](std::sync::Arc) snapshots.

mod events;
mod reducer;
mod store;

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString, IntoStaticStr};

pub use events::{
    AlertEvent, CalibratingEvent, EventKind, GuideEvent, SettleDoneEvent, SettlingEvent,
};
pub use reducer::reduce;
pub(crate) use reducer::{apply_response, connected, disconnected};
pub(crate) use store::StateStore;
pub use store::Subscription;

pub(crate) const STATE_TARGET: &str = "phd2_client::state";

/// Application phase reported by the server.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    IntoStaticStr,
)]
pub enum AppPhase {
    /// Idle; no exposures running.
    #[default]
    Stopped,
    /// A guide star is selected but exposures are not looping.
    Selected,
    /// Calibration is running.
    Calibrating,
    /// Guiding is running.
    Guiding,
    /// Guiding is running but the star was lost.
    LostLock,
    /// Guiding is paused.
    Paused,
    /// Exposures are looping without guiding.
    Looping,
}

impl AppPhase {
    /// Whether the phase belongs to an active calibration or guiding run.
    #[must_use]
    pub const fn is_guiding(self) -> bool {
        matches!(
            self,
            Self::Calibrating | Self::Guiding | Self::LostLock | Self::Paused
        )
    }
}

/// Connection flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionState {
    /// Socket to the guiding server is open.
    pub server_connected: bool,
    /// The server's equipment is connected.
    pub device_connected: bool,
}

/// A position on the guide camera frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal pixel coordinate.
    #[serde(rename = "X")]
    pub x: f64,
    /// Vertical pixel coordinate.
    #[serde(rename = "Y")]
    pub y: f64,
}

/// Calibration progress and outcome.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CalibrationStatus {
    /// Whether the mount holds usable calibration data.
    pub calibrated: bool,
    /// Mount being calibrated or last calibrated.
    pub mount: Option<String>,
    /// Current calibration direction.
    pub direction: Option<String>,
    /// Distance moved from the starting position, in pixels.
    pub distance: Option<f64>,
    /// Horizontal offset from the starting position.
    pub dx: Option<f64>,
    /// Vertical offset from the starting position.
    pub dy: Option<f64>,
    /// Star position at the last calibration step.
    pub position: Option<Point>,
    /// Calibration step number.
    pub step: Option<u32>,
    /// Server description of the calibration state.
    pub state: Option<String>,
    /// Calibration data was flipped for a meridian flip.
    pub flipped: bool,
    /// Reason given by the last failed calibration.
    pub failure: Option<String>,
}

/// Per-frame guiding telemetry from the last `GuideStep` event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuideStepStatus {
    /// Exposure frame number.
    #[serde(rename = "Frame")]
    pub frame: u64,
    /// Seconds since guiding started.
    #[serde(rename = "Time")]
    pub time: f64,
    /// Mount that received the correction.
    #[serde(rename = "Mount")]
    pub mount: Option<String>,
    /// Horizontal camera offset, in pixels.
    pub dx: f64,
    /// Vertical camera offset, in pixels.
    pub dy: f64,
    /// Raw right ascension distance, in pixels.
    #[serde(rename = "RADistanceRaw")]
    pub ra_distance_raw: f64,
    /// Raw declination distance, in pixels.
    #[serde(rename = "DECDistanceRaw")]
    pub dec_distance_raw: f64,
    /// Right ascension distance after guide algorithms.
    #[serde(rename = "RADistanceGuide")]
    pub ra_distance_guide: f64,
    /// Declination distance after guide algorithms.
    #[serde(rename = "DECDistanceGuide")]
    pub dec_distance_guide: f64,
    /// Right ascension pulse length, in milliseconds.
    #[serde(rename = "RADuration")]
    pub ra_duration: i64,
    /// Right ascension pulse direction.
    #[serde(rename = "RADirection")]
    pub ra_direction: Option<String>,
    /// Declination pulse length, in milliseconds.
    #[serde(rename = "DECDuration")]
    pub dec_duration: i64,
    /// Declination pulse direction.
    #[serde(rename = "DECDirection")]
    pub dec_direction: Option<String>,
    /// Right ascension correction was clipped by the max duration.
    #[serde(rename = "RALimited")]
    pub ra_limited: bool,
    /// Declination correction was clipped by the max duration.
    #[serde(rename = "DecLimited")]
    pub dec_limited: bool,
    /// Star signal-to-noise ratio.
    #[serde(rename = "SNR")]
    pub snr: f64,
    /// Star mass.
    #[serde(rename = "StarMass")]
    pub star_mass: f64,
    /// Half-flux diameter, in pixels.
    #[serde(rename = "HFD")]
    pub hfd: f64,
    /// Smoothed average guide distance.
    #[serde(rename = "AvgDist")]
    pub avg_dist: f64,
    /// Star-finder error code.
    #[serde(rename = "ErrorCode")]
    pub error_code: i64,
}

/// Details of the last `StarLost` event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StarLostStatus {
    /// Frame on which the star was lost.
    #[serde(rename = "Frame")]
    pub frame: u64,
    /// Seconds since guiding started.
    #[serde(rename = "Time")]
    pub time: f64,
    /// Star mass at the moment of loss.
    #[serde(rename = "StarMass")]
    pub star_mass: f64,
    /// Signal-to-noise ratio at the moment of loss.
    #[serde(rename = "SNR")]
    pub snr: f64,
    /// Smoothed average guide distance.
    #[serde(rename = "AvgDist")]
    pub avg_dist: f64,
    /// Star-finder error code.
    #[serde(rename = "ErrorCode")]
    pub error_code: i64,
    /// Server description of the failure.
    #[serde(rename = "Status")]
    pub status: Option<String>,
}

/// Guide star tracking flags and positions.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StarStatus {
    /// The guide star was lost and not yet reacquired.
    pub lost: bool,
    /// The lock position was lost.
    pub lock_lost: bool,
    /// The lock position reached the edge of the frame.
    pub shift_limit_reached: bool,
    /// Current lock position.
    pub lock_position: Option<Point>,
    /// Position of the selected guide star.
    pub selected: Option<Point>,
    /// Details of the last star loss.
    pub last_lost: Option<StarLostStatus>,
}

/// Settling progress after guiding starts or a dither.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SettleStatus {
    /// A settle is running.
    pub in_progress: bool,
    /// Current distance from the lock position, in pixels.
    pub distance: Option<f64>,
    /// Seconds elapsed since settling began.
    pub elapsed: Option<f64>,
    /// Seconds the star must stay within tolerance.
    pub settle_time: Option<f64>,
    /// The star is locked.
    pub star_locked: bool,
    /// Frames examined by the finished settle.
    pub total_frames: Option<u64>,
    /// Frames dropped during the finished settle.
    pub dropped_frames: Option<u64>,
    /// Outcome of the last finished settle.
    pub success: Option<bool>,
    /// Error reported by a failed settle.
    pub error: Option<String>,
}

/// Name and connection flag of one device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Device name.
    pub name: String,
    /// Whether the server has the device connected.
    pub connected: bool,
}

/// Equipment attached to the current profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EquipmentSnapshot {
    /// Guide camera.
    pub camera: Option<DeviceInfo>,
    /// Guide mount.
    pub mount: Option<DeviceInfo>,
    /// Auxiliary mount.
    pub aux_mount: Option<DeviceInfo>,
    /// Adaptive optics unit.
    #[serde(rename = "AO")]
    pub ao: Option<DeviceInfo>,
    /// Rotator.
    pub rotator: Option<DeviceInfo>,
}

/// An equipment profile stored by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Profile id.
    pub id: i64,
    /// Profile name.
    #[serde(default)]
    pub name: String,
}

/// Camera cooler readings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoolerStatus {
    /// Sensor temperature, in degrees Celsius.
    pub temperature: Option<f64>,
    /// Whether the cooler is running.
    #[serde(rename = "coolerOn")]
    pub cooler_on: bool,
    /// Cooler set point, in degrees Celsius.
    pub setpoint: Option<f64>,
    /// Cooler power, in percent.
    pub power: Option<f64>,
}

/// Server version announced at session start.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerVersion {
    /// Application version.
    #[serde(rename = "PHDVersion")]
    pub version: String,
    /// Application sub-version.
    #[serde(rename = "PHDSubver")]
    pub subversion: String,
    /// Event protocol version.
    #[serde(rename = "MsgVersion")]
    pub msg_version: u32,
    /// Whether the server overlaps exposures with guide pulses.
    #[serde(rename = "OverlapSupport")]
    pub overlap_support: bool,
}

/// Looping exposure status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoopingStatus {
    /// Exposures are looping.
    pub active: bool,
    /// Last frame number reported while looping.
    pub frame: Option<u64>,
}

/// Offset applied by the last dither.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DitherOffset {
    /// Horizontal offset, in pixels.
    pub dx: f64,
    /// Vertical offset, in pixels.
    pub dy: f64,
}

/// A guiding parameter changed on the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuideParamChange {
    /// Parameter name.
    #[serde(rename = "Name")]
    pub name: String,
    /// New value.
    #[serde(rename = "Value", default)]
    pub value: Value,
}

/// Aggregated snapshot of everything known about the guiding server.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GuidingState {
    /// Connection flags.
    pub connection: ConnectionState,
    /// Application phase.
    pub phase: AppPhase,
    /// Calibration progress.
    pub calibration: CalibrationStatus,
    /// Last guide step, if guiding has produced one.
    pub guide_step: Option<GuideStepStatus>,
    /// Settling progress.
    pub settle: SettleStatus,
    /// Guide star tracking.
    pub star: StarStatus,
    /// Looping exposures.
    pub looping: LoopingStatus,
    /// Connected equipment.
    pub equipment: EquipmentSnapshot,
    /// Known equipment profiles.
    pub profiles: Vec<Profile>,
    /// Selected profile.
    pub profile: Option<Profile>,
    /// Guide exposure, in milliseconds.
    pub exposure_ms: Option<u64>,
    /// Last cooler reading.
    pub cooler: Option<CoolerStatus>,
    /// Server version.
    pub version: Option<ServerVersion>,
    /// Last dither offset.
    pub last_dither: Option<DitherOffset>,
    /// Last guiding parameter change.
    pub last_param_change: Option<GuideParamChange>,
    /// Number of configuration changes seen this session.
    pub configuration_changes: u64,
}
