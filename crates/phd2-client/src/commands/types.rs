//! Argument and result types for the typed command set.

use serde::{Deserialize, Serialize};

use crate::state::Point;

/// Settling criteria sent with `guide` and `dither`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SettleParams {
    /// Maximum guide distance, in pixels, for the star to count as settled.
    pub pixels: f64,
    /// Seconds the star must stay within `pixels`.
    pub time: u32,
    /// Seconds to wait before giving up.
    pub timeout: u32,
}

impl Default for SettleParams {
    fn default() -> Self {
        Self {
            pixels: 1.5,
            time: 10,
            timeout: 60,
        }
    }
}

impl SettleParams {
    pub(super) fn check(&self) -> Result<(), String> {
        if !self.pixels.is_finite() || self.pixels <= 0.0 {
            return Err(format!("settle pixels must be positive, got {}", self.pixels));
        }
        if self.timeout == 0 {
            return Err("settle timeout must be positive".to_owned());
        }
        if self.time > self.timeout {
            return Err(format!(
                "settle time {}s exceeds timeout {}s",
                self.time, self.timeout
            ));
        }
        Ok(())
    }
}

/// Region of the frame in which to look for a guide star.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Roi {
    /// Left edge, in pixels.
    pub x: u32,
    /// Top edge, in pixels.
    pub y: u32,
    /// Width, in pixels.
    pub width: u32,
    /// Height, in pixels.
    pub height: u32,
}

impl Roi {
    pub(super) const fn as_array(self) -> [u32; 4] {
        [self.x, self.y, self.width, self.height]
    }
}

/// Device whose calibration is queried.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum CalibrationTarget {
    /// The guide mount.
    #[default]
    Mount,
    /// The adaptive optics unit.
    #[serde(rename = "AO")]
    Ao,
}

/// Calibration data to discard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClearCalibrationTarget {
    /// The guide mount.
    Mount,
    /// The adaptive optics unit.
    Ao,
    /// Both devices.
    #[default]
    Both,
}

/// Calibration data reported by the server.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CalibrationData {
    /// Whether the device is calibrated.
    pub calibrated: bool,
    /// Camera angle of the X axis, in degrees.
    pub x_angle: Option<f64>,
    /// X axis guide rate, in pixels per second.
    pub x_rate: Option<f64>,
    /// X axis parity, `+` or `-`.
    pub x_parity: Option<String>,
    /// Camera angle of the Y axis, in degrees.
    pub y_angle: Option<f64>,
    /// Y axis guide rate, in pixels per second.
    pub y_rate: Option<f64>,
    /// Y axis parity, `+` or `-`.
    pub y_parity: Option<String>,
    /// Declination at calibration time, in degrees.
    pub declination: Option<f64>,
}

/// Guide camera frame dimensions, decoded from `[width, height]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "[u32; 2]")]
pub struct FrameSize {
    /// Width, in pixels.
    pub width: u32,
    /// Height, in pixels.
    pub height: u32,
}

impl From<[u32; 2]> for FrameSize {
    fn from([width, height]: [u32; 2]) -> Self {
        Self { width, height }
    }
}

/// Guide star cut-out returned by `get_star_image`.
///
/// The pixel data is passed through untouched.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StarImage {
    /// Frame number.
    pub frame: u64,
    /// Cut-out width, in pixels.
    pub width: u32,
    /// Cut-out height, in pixels.
    pub height: u32,
    /// Star position within the cut-out.
    #[serde(deserialize_with = "point_from_pair")]
    pub star_pos: Point,
    /// Base64-encoded 16-bit pixels.
    pub pixels: String,
}

fn point_from_pair<'de, D>(deserializer: D) -> Result<Point, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let [x, y] = <[f64; 2]>::deserialize(deserializer)?;
    Ok(Point { x, y })
}

#[derive(Deserialize)]
pub(super) struct SavedImage {
    pub(super) filename: String,
}

#[derive(Deserialize)]
pub(super) struct Temperature {
    pub(super) temperature: f64,
}

#[derive(Serialize)]
pub(super) struct GuideRequest<'a> {
    pub(super) settle: &'a SettleParams,
    pub(super) recalibrate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) roi: Option<[u32; 4]>,
}

#[derive(Serialize)]
pub(super) struct DitherRequest<'a> {
    pub(super) amount: f64,
    #[serde(rename = "raOnly")]
    pub(super) ra_only: bool,
    pub(super) settle: &'a SettleParams,
}

#[derive(Serialize)]
pub(super) struct CalibrationQuery {
    pub(super) which: CalibrationTarget,
}

#[derive(Serialize)]
pub(super) struct CalibrationClear {
    pub(super) which: ClearCalibrationTarget,
}
