//! Typed wrappers over [`Session::call`] for the guider command set.
//!
//! Every wrapper validates its arguments before anything is sent, decodes
//! the result into a concrete type, and turns server rejections into
//! [`GuiderError::Rejected`]. Nothing is retried here.

mod error;
mod types;

#[cfg(test)]
mod tests;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::errors::CommandError;
use crate::session::Session;
use crate::state::{AppPhase, CoolerStatus, EquipmentSnapshot, Profile};

pub use error::GuiderError;
pub use types::{
    CalibrationData, CalibrationTarget, ClearCalibrationTarget, FrameSize, Roi, SettleParams,
    StarImage,
};

use types::{
    CalibrationClear, CalibrationQuery, DitherRequest, GuideRequest, SavedImage, Temperature,
};

/// Smallest star image cut-out the server produces.
pub const MIN_STAR_IMAGE_SIZE: u32 = 15;

fn encode<T: Serialize>(method: &'static str, params: &T) -> Result<Value, GuiderError> {
    serde_json::to_value(params).map_err(|source| {
        GuiderError::Command(CommandError::Encode {
            method: method.to_owned(),
            source,
        })
    })
}

impl Session {
    fn invoke(&self, method: &'static str, params: Option<Value>) -> Result<Value, GuiderError> {
        self.call(method, params, self.command_timeout())
            .map_err(|error| GuiderError::from_command(method, error))
    }

    fn invoke_as<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Option<Value>,
    ) -> Result<T, GuiderError> {
        let result = self.invoke(method, params)?;
        serde_json::from_value(result)
            .map_err(|source| GuiderError::UnexpectedResult { method, source })
    }

    fn invoke_unit(&self, method: &'static str, params: Option<Value>) -> Result<(), GuiderError> {
        self.invoke(method, params).map(drop)
    }

    /// Lists the equipment profiles known to the server.
    ///
    /// # Errors
    ///
    /// Returns [`GuiderError`] when the command fails.
    pub fn get_profiles(&self) -> Result<Vec<Profile>, GuiderError> {
        self.invoke_as("get_profiles", None)
    }

    /// Returns the selected equipment profile.
    ///
    /// # Errors
    ///
    /// Returns [`GuiderError`] when the command fails.
    pub fn get_profile(&self) -> Result<Profile, GuiderError> {
        self.invoke_as("get_profile", None)
    }

    /// Selects the equipment profile with id `id`.
    ///
    /// When the profile list has been fetched, `id` must name one of its
    /// entries.
    ///
    /// # Errors
    ///
    /// Returns [`GuiderError::InvalidArgument`] for unknown ids, otherwise
    /// [`GuiderError`] when the command fails.
    pub fn set_profile(&self, id: i64) -> Result<(), GuiderError> {
        const METHOD: &str = "set_profile";
        if id <= 0 {
            return Err(GuiderError::invalid(METHOD, format!("profile id {id} is not positive")));
        }
        let state = self.snapshot();
        if !state.profiles.is_empty() && state.profiles.iter().all(|profile| profile.id != id) {
            return Err(GuiderError::invalid(
                METHOD,
                format!("profile id {id} does not reference an existing profile"),
            ));
        }
        self.invoke_unit(METHOD, Some(json!([id])))
    }

    /// Connects (`true`) or disconnects (`false`) the profile's equipment.
    ///
    /// # Errors
    ///
    /// Returns [`GuiderError`] when the command fails.
    pub fn set_connected(&self, connected: bool) -> Result<(), GuiderError> {
        self.invoke_unit("set_connected", Some(json!([connected])))
    }

    /// Whether the profile's equipment is connected.
    ///
    /// # Errors
    ///
    /// Returns [`GuiderError`] when the command fails.
    pub fn get_connected(&self) -> Result<bool, GuiderError> {
        self.invoke_as("get_connected", None)
    }

    /// Current guide exposure, in milliseconds.
    ///
    /// # Errors
    ///
    /// Returns [`GuiderError`] when the command fails.
    pub fn get_exposure(&self) -> Result<u32, GuiderError> {
        self.invoke_as("get_exposure", None)
    }

    /// Sets the guide exposure, in milliseconds.
    ///
    /// # Errors
    ///
    /// Returns [`GuiderError::InvalidArgument`] for a zero exposure,
    /// otherwise [`GuiderError`] when the command fails.
    pub fn set_exposure(&self, exposure_ms: u32) -> Result<(), GuiderError> {
        const METHOD: &str = "set_exposure";
        if exposure_ms == 0 {
            return Err(GuiderError::invalid(METHOD, "exposure must be positive"));
        }
        self.invoke_unit(METHOD, Some(json!([exposure_ms])))
    }

    /// Exposure durations the camera supports, in milliseconds.
    ///
    /// # Errors
    ///
    /// Returns [`GuiderError`] when the command fails.
    pub fn get_exposure_durations(&self) -> Result<Vec<u32>, GuiderError> {
        self.invoke_as("get_exposure_durations", None)
    }

    /// Calibration data for `target`.
    ///
    /// # Errors
    ///
    /// Returns [`GuiderError`] when the command fails.
    pub fn get_calibration_data(
        &self,
        target: CalibrationTarget,
    ) -> Result<CalibrationData, GuiderError> {
        const METHOD: &str = "get_calibration_data";
        let params = encode(METHOD, &CalibrationQuery { which: target })?;
        self.invoke_as(METHOD, Some(params))
    }

    /// Discards calibration data for `target`.
    ///
    /// # Errors
    ///
    /// Returns [`GuiderError`] when the command fails.
    pub fn clear_calibration(&self, target: ClearCalibrationTarget) -> Result<(), GuiderError> {
        const METHOD: &str = "clear_calibration";
        let params = encode(METHOD, &CalibrationClear { which: target })?;
        self.invoke_unit(METHOD, Some(params))
    }

    /// Flips the mount calibration after a meridian flip.
    ///
    /// # Errors
    ///
    /// Returns [`GuiderError`] when the command fails.
    pub fn flip_calibration(&self) -> Result<(), GuiderError> {
        self.invoke_unit("flip_calibration", None)
    }

    /// Whether the mount is calibrated.
    ///
    /// # Errors
    ///
    /// Returns [`GuiderError`] when the command fails.
    pub fn get_calibrated(&self) -> Result<bool, GuiderError> {
        self.invoke_as("get_calibrated", None)
    }

    /// Starts guiding, calibrating first if needed or if `recalibrate` is set.
    ///
    /// Completion is reported by the `SettleDone` event, visible through
    /// [`Session::snapshot`].
    ///
    /// # Errors
    ///
    /// Returns [`GuiderError::InvalidArgument`] for inconsistent settle
    /// criteria or an empty region, otherwise [`GuiderError`] when the
    /// command fails.
    pub fn guide(
        &self,
        settle: &SettleParams,
        recalibrate: bool,
        roi: Option<Roi>,
    ) -> Result<(), GuiderError> {
        const METHOD: &str = "guide";
        settle
            .check()
            .map_err(|reason| GuiderError::invalid(METHOD, reason))?;
        if let Some(region) = roi.filter(|region| region.width == 0 || region.height == 0) {
            return Err(GuiderError::invalid(
                METHOD,
                format!("region {}x{} is empty", region.width, region.height),
            ));
        }
        let request = GuideRequest {
            settle,
            recalibrate,
            roi: roi.map(Roi::as_array),
        };
        let params = encode(METHOD, &request)?;
        self.invoke_unit(METHOD, Some(params))
    }

    /// Shifts the lock position by up to `amount` pixels.
    ///
    /// # Errors
    ///
    /// Returns [`GuiderError::InvalidArgument`] for a non-positive amount or
    /// inconsistent settle criteria, otherwise [`GuiderError`] when the
    /// command fails.
    pub fn dither(
        &self,
        amount: f64,
        ra_only: bool,
        settle: &SettleParams,
    ) -> Result<(), GuiderError> {
        const METHOD: &str = "dither";
        if !amount.is_finite() || amount <= 0.0 {
            return Err(GuiderError::invalid(
                METHOD,
                format!("dither amount must be positive, got {amount}"),
            ));
        }
        settle
            .check()
            .map_err(|reason| GuiderError::invalid(METHOD, reason))?;
        let request = DitherRequest {
            amount,
            ra_only,
            settle,
        };
        let params = encode(METHOD, &request)?;
        self.invoke_unit(METHOD, Some(params))
    }

    /// Pauses or resumes guiding.
    ///
    /// With `full` set, pausing also stops looping exposures.
    ///
    /// # Errors
    ///
    /// Returns [`GuiderError`] when the command fails.
    pub fn set_paused(&self, paused: bool, full: bool) -> Result<(), GuiderError> {
        let params = if paused && full {
            json!([paused, "full"])
        } else {
            json!([paused])
        };
        self.invoke_unit("set_paused", Some(params))
    }

    /// Stops guiding but keeps exposures looping.
    ///
    /// # Errors
    ///
    /// Returns [`GuiderError`] when the command fails.
    pub fn stop_guiding(&self) -> Result<(), GuiderError> {
        self.set_paused(true, false)
    }

    /// Stops guiding and looping.
    ///
    /// # Errors
    ///
    /// Returns [`GuiderError`] when the command fails.
    pub fn stop_looping(&self) -> Result<(), GuiderError> {
        self.set_paused(true, true)
    }

    /// Starts looping exposures.
    ///
    /// # Errors
    ///
    /// Returns [`GuiderError`] when the command fails.
    pub fn start_looping(&self) -> Result<(), GuiderError> {
        self.invoke_unit("loop", Some(json!([true])))
    }

    /// Cut-out around the guide star; `size` defaults to the server's choice.
    ///
    /// # Errors
    ///
    /// Returns [`GuiderError::InvalidArgument`] when `size` is below
    /// [`MIN_STAR_IMAGE_SIZE`], otherwise [`GuiderError`] when the command
    /// fails.
    pub fn get_star_image(&self, size: Option<u32>) -> Result<StarImage, GuiderError> {
        const METHOD: &str = "get_star_image";
        if let Some(requested) = size.filter(|requested| *requested < MIN_STAR_IMAGE_SIZE) {
            return Err(GuiderError::invalid(
                METHOD,
                format!("size {requested} is below the minimum of {MIN_STAR_IMAGE_SIZE}"),
            ));
        }
        self.invoke_as(METHOD, size.map(|requested| json!([requested])))
    }

    /// Saves the current frame on the server and returns its path.
    ///
    /// # Errors
    ///
    /// Returns [`GuiderError`] when the command fails.
    pub fn save_image(&self) -> Result<String, GuiderError> {
        self.invoke_as::<SavedImage>("save_image", None)
            .map(|saved| saved.filename)
    }

    /// Equipment attached to the selected profile.
    ///
    /// # Errors
    ///
    /// Returns [`GuiderError`] when the command fails.
    pub fn get_current_equipment(&self) -> Result<EquipmentSnapshot, GuiderError> {
        self.invoke_as("get_current_equipment", None)
    }

    /// Guide camera frame dimensions.
    ///
    /// # Errors
    ///
    /// Returns [`GuiderError`] when the command fails.
    pub fn get_camera_frame_size(&self) -> Result<FrameSize, GuiderError> {
        self.invoke_as("get_camera_frame_size", None)
    }

    /// Guide camera cooler readings.
    ///
    /// # Errors
    ///
    /// Returns [`GuiderError`] when the command fails.
    pub fn get_cooler_status(&self) -> Result<CoolerStatus, GuiderError> {
        self.invoke_as("get_cooler_status", None)
    }

    /// Image scale in arc-seconds per pixel, when known.
    ///
    /// # Errors
    ///
    /// Returns [`GuiderError`] when the command fails.
    pub fn get_pixel_scale(&self) -> Result<Option<f64>, GuiderError> {
        self.invoke_as("get_pixel_scale", None)
    }

    /// Guide camera sensor temperature, in degrees Celsius.
    ///
    /// # Errors
    ///
    /// Returns [`GuiderError`] when the command fails.
    pub fn get_ccd_temperature(&self) -> Result<f64, GuiderError> {
        self.invoke_as::<Temperature>("get_ccd_temperature", None)
            .map(|reading| reading.temperature)
    }

    /// Whether the camera uses subframes.
    ///
    /// # Errors
    ///
    /// Returns [`GuiderError`] when the command fails.
    pub fn get_use_subframes(&self) -> Result<bool, GuiderError> {
        self.invoke_as("get_use_subframes", None)
    }

    /// Application phase as reported by the server.
    ///
    /// # Errors
    ///
    /// Returns [`GuiderError`] when the command fails.
    pub fn get_app_state(&self) -> Result<AppPhase, GuiderError> {
        self.invoke_as("get_app_state", None)
    }

    /// Asks the server application to exit.
    ///
    /// # Errors
    ///
    /// Returns [`GuiderError`] when the command fails.
    pub fn shutdown(&self) -> Result<(), GuiderError> {
        self.invoke_unit("shutdown", None)
    }
}
