//! Pure reduction of events and command results into [`GuidingState`].

use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{info, warn};

use super::events::{CalibratingEvent, GuideEvent, SettleDoneEvent, SettlingEvent};
use super::{
    AppPhase, CalibrationStatus, ConnectionState, CoolerStatus, EquipmentSnapshot, GuidingState,
    Point, Profile, STATE_TARGET, SettleStatus,
};

/// Folds one event into `state`.
///
/// Deterministic: the result depends only on `state` and `event`. Events
/// that carry no structured state, such as `Alert`, return `state` unchanged.
#[must_use]
pub fn reduce(mut state: GuidingState, event: &GuideEvent) -> GuidingState {
    match event {
        GuideEvent::Version(version) => state.version = Some(version.clone()),
        GuideEvent::AppState { state: name } => apply_app_state(&mut state, name),
        GuideEvent::StartGuiding | GuideEvent::Resumed => state.phase = AppPhase::Guiding,
        GuideEvent::Paused => state.phase = AppPhase::Paused,
        GuideEvent::GuidingStopped => {
            if state.phase.is_guiding() {
                state.phase = AppPhase::Stopped;
            }
            state.settle.in_progress = false;
        }
        GuideEvent::LoopingExposures { frame } => {
            state.looping.active = true;
            state.looping.frame = *frame;
        }
        GuideEvent::LoopingExposuresStopped => state.looping.active = false,
        GuideEvent::GuideStep(step) => {
            state.guide_step = Some(step.clone());
            state.star.lost = false;
        }
        GuideEvent::GuidingDithered(offset) => state.last_dither = Some(*offset),
        GuideEvent::GuideParamChange(change) => state.last_param_change = Some(change.clone()),
        GuideEvent::ConfigurationChange => {
            state.configuration_changes = state.configuration_changes.saturating_add(1);
        }
        GuideEvent::Alert(alert) => {
            warn!(
                target: STATE_TARGET,
                kind = alert.kind.as_deref().unwrap_or("unknown"),
                message = %alert.message,
                "server alert"
            );
        }
        GuideEvent::StartCalibration { .. }
        | GuideEvent::Calibrating(_)
        | GuideEvent::CalibrationComplete { .. }
        | GuideEvent::CalibrationFailed { .. }
        | GuideEvent::CalibrationDataFlipped { .. } => reduce_calibration(&mut state, event),
        GuideEvent::SettleBegin | GuideEvent::Settling(_) | GuideEvent::SettleDone(_) => {
            reduce_settle(&mut state.settle, event);
        }
        GuideEvent::StarLost(_)
        | GuideEvent::StarSelected(_)
        | GuideEvent::LockPositionSet(_)
        | GuideEvent::LockPositionLost
        | GuideEvent::LockPositionShiftLimitReached => reduce_star(&mut state, event),
    }
    state
}

fn apply_app_state(state: &mut GuidingState, name: &str) {
    let Ok(phase) = AppPhase::from_str(name) else {
        warn!(target: STATE_TARGET, state = name, "ignoring unknown application state");
        return;
    };
    state.phase = phase;
    match phase {
        AppPhase::Stopped | AppPhase::Selected => {
            state.looping.active = false;
            state.settle.in_progress = false;
        }
        AppPhase::Looping => state.looping.active = true,
        AppPhase::LostLock => state.star.lost = true,
        AppPhase::Calibrating | AppPhase::Guiding | AppPhase::Paused => {}
    }
}

fn reduce_calibration(state: &mut GuidingState, event: &GuideEvent) {
    let calibration = &mut state.calibration;
    match event {
        GuideEvent::StartCalibration { mount } => {
            state.phase = AppPhase::Calibrating;
            let calibrating_mount = mount.clone().or_else(|| calibration.mount.take());
            *calibration = CalibrationStatus {
                calibrated: calibration.calibrated,
                flipped: calibration.flipped,
                mount: calibrating_mount,
                ..CalibrationStatus::default()
            };
            info!(target: STATE_TARGET, mount = ?calibration.mount, "calibration started");
        }
        GuideEvent::Calibrating(step) => {
            state.phase = AppPhase::Calibrating;
            apply_calibration_step(calibration, step);
        }
        GuideEvent::CalibrationComplete { mount } => {
            calibration.calibrated = true;
            calibration.failure = None;
            if mount.is_some() {
                calibration.mount.clone_from(mount);
            }
            info!(target: STATE_TARGET, mount = ?calibration.mount, "calibration complete");
        }
        GuideEvent::CalibrationFailed { reason } => {
            calibration.calibrated = false;
            calibration.failure.clone_from(reason);
            if state.phase == AppPhase::Calibrating {
                state.phase = AppPhase::Stopped;
            }
            warn!(target: STATE_TARGET, reason = ?reason, "calibration failed");
        }
        GuideEvent::CalibrationDataFlipped { mount } => {
            calibration.flipped = true;
            if mount.is_some() {
                calibration.mount.clone_from(mount);
            }
            info!(target: STATE_TARGET, "calibration data flipped");
        }
        _ => {}
    }
}

fn apply_calibration_step(calibration: &mut CalibrationStatus, step: &CalibratingEvent) {
    if step.mount.is_some() {
        calibration.mount.clone_from(&step.mount);
    }
    if step.direction.is_some() {
        calibration.direction.clone_from(&step.direction);
    }
    if step.state.is_some() {
        calibration.state.clone_from(&step.state);
    }
    calibration.distance = step.distance.or(calibration.distance);
    calibration.dx = step.dx.or(calibration.dx);
    calibration.dy = step.dy.or(calibration.dy);
    calibration.step = step.step.or(calibration.step);
    calibration.position = step
        .pos
        .map(|[x, y]| Point { x, y })
        .or(calibration.position);
}

fn reduce_settle(settle: &mut SettleStatus, event: &GuideEvent) {
    match event {
        GuideEvent::SettleBegin => {
            *settle = SettleStatus {
                in_progress: true,
                ..SettleStatus::default()
            };
        }
        GuideEvent::Settling(progress) => apply_settling(settle, progress),
        GuideEvent::SettleDone(done) => apply_settle_done(settle, done),
        _ => {}
    }
}

fn apply_settling(settle: &mut SettleStatus, progress: &SettlingEvent) {
    settle.in_progress = true;
    settle.distance = progress.distance;
    settle.elapsed = progress.time;
    settle.settle_time = progress.settle_time;
    settle.star_locked = progress.star_locked;
}

fn apply_settle_done(settle: &mut SettleStatus, done: &SettleDoneEvent) {
    let success = done.succeeded();
    settle.in_progress = false;
    settle.success = Some(success);
    settle.error = if success { None } else { done.error.clone() };
    settle.total_frames = done.total_frames;
    settle.dropped_frames = done.dropped_frames;
    if success {
        info!(target: STATE_TARGET, "settle succeeded");
    } else {
        info!(target: STATE_TARGET, error = ?done.error, "settle failed");
    }
}

fn reduce_star(state: &mut GuidingState, event: &GuideEvent) {
    let star = &mut state.star;
    match event {
        GuideEvent::StarLost(lost) => {
            star.lost = true;
            star.last_lost = Some(lost.clone());
            warn!(
                target: STATE_TARGET,
                frame = lost.frame,
                snr = lost.snr,
                star_mass = lost.star_mass,
                avg_dist = lost.avg_dist,
                "star lost"
            );
        }
        GuideEvent::StarSelected(position) => {
            star.selected = Some(*position);
            star.lost = false;
        }
        GuideEvent::LockPositionSet(position) => {
            star.lock_position = Some(*position);
            star.lock_lost = false;
            star.shift_limit_reached = false;
        }
        GuideEvent::LockPositionLost => {
            star.lock_lost = true;
            warn!(target: STATE_TARGET, "lock position lost");
        }
        GuideEvent::LockPositionShiftLimitReached => {
            star.shift_limit_reached = true;
            warn!(target: STATE_TARGET, "lock position reached the edge of the frame");
        }
        _ => {}
    }
}

/// Fresh state for a newly opened connection.
pub(crate) fn connected() -> GuidingState {
    GuidingState {
        connection: ConnectionState {
            server_connected: true,
            device_connected: false,
        },
        ..GuidingState::default()
    }
}

/// Marks the connection as gone while keeping the last known telemetry.
pub(crate) fn disconnected(mut state: GuidingState) -> GuidingState {
    state.connection = ConnectionState::default();
    state.phase = AppPhase::Stopped;
    state.settle.in_progress = false;
    state.looping.active = false;
    state
}

fn decode<T: DeserializeOwned>(method: &str, value: &Value) -> Option<T> {
    T::deserialize(value)
        .inspect_err(|error| {
            warn!(target: STATE_TARGET, method, %error, "ignoring undecodable result");
        })
        .ok()
}

fn first_param<T: DeserializeOwned>(method: &str, params: Option<&Value>) -> Option<T> {
    let first = params.and_then(|value| value.get(0))?;
    decode(method, first)
}

/// Folds a successful command result into `state`.
///
/// Only commands whose results describe server state have an effect; every
/// other method returns `state` unchanged.
pub(crate) fn apply_response(
    mut state: GuidingState,
    method: &str,
    params: Option<&Value>,
    result: &Value,
) -> GuidingState {
    match method {
        "get_profiles" => {
            if let Some(profiles) = decode::<Vec<Profile>>(method, result) {
                state.profiles = profiles;
            }
        }
        "get_profile" => {
            if let Some(profile) = decode::<Profile>(method, result) {
                state.profile = Some(profile);
            }
        }
        "set_profile" => {
            if let Some(id) = first_param::<i64>(method, params) {
                let known = state.profiles.iter().find(|profile| profile.id == id).cloned();
                state.profile = Some(known.unwrap_or(Profile {
                    id,
                    name: String::new(),
                }));
            }
        }
        "set_connected" => {
            if let Some(connected) = first_param::<bool>(method, params) {
                state.connection.device_connected = connected;
            }
        }
        "get_connected" => {
            if let Some(connected) = decode::<bool>(method, result) {
                state.connection.device_connected = connected;
            }
        }
        "get_exposure" => state.exposure_ms = decode(method, result).or(state.exposure_ms),
        "set_exposure" => state.exposure_ms = first_param(method, params).or(state.exposure_ms),
        "get_current_equipment" => {
            if let Some(equipment) = decode::<EquipmentSnapshot>(method, result) {
                state.equipment = equipment;
            }
        }
        "get_calibrated" => {
            if let Some(calibrated) = decode::<bool>(method, result) {
                state.calibration.calibrated = calibrated;
            }
        }
        "get_cooler_status" => {
            state.cooler = decode::<CoolerStatus>(method, result).or(state.cooler);
        }
        _ => {}
    }
    state
}
