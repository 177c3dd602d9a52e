//! Unit tests for event decoding, reduction and the state store.

use std::time::Duration;

use rstest::{fixture, rstest};
use serde_json::{Value, json};

use super::*;
use crate::errors::ProtocolDecodeWarning;
use crate::protocol::EventMessage;

fn event(value: &Value) -> GuideEvent {
    let Value::Object(body) = value.clone() else {
        panic!("event fixture must be an object");
    };
    let name = body
        .get("Event")
        .and_then(Value::as_str)
        .expect("event name")
        .to_owned();
    GuideEvent::decode(EventMessage { name, body }).expect("decodable event")
}

fn fold(events: &[Value]) -> GuidingState {
    events
        .iter()
        .map(event)
        .fold(connected(), |state, next| reduce(state, &next))
}

#[fixture]
fn session_events() -> Vec<Value> {
    vec![
        json!({"Event": "Version", "PHDVersion": "2.6.11", "PHDSubver": "dev4", "MsgVersion": 1, "OverlapSupport": true}),
        json!({"Event": "AppState", "State": "Looping"}),
        json!({"Event": "LoopingExposures", "Frame": 12}),
        json!({"Event": "StarSelected", "X": 320.5, "Y": 240.25}),
        json!({"Event": "StartCalibration", "Mount": "Simulator"}),
        json!({"Event": "Calibrating", "Mount": "Simulator", "dir": "West", "dist": 4.2, "dx": 4.0, "dy": 1.1, "pos": [324.5, 241.3], "step": 3, "State": "West step 3"}),
        json!({"Event": "CalibrationComplete", "Mount": "Simulator"}),
        json!({"Event": "StartGuiding"}),
        json!({"Event": "SettleBegin"}),
        json!({"Event": "Settling", "Distance": 0.8, "Time": 3.0, "SettleTime": 10.0, "StarLocked": true}),
        json!({"Event": "SettleDone", "Status": 0, "TotalFrames": 7, "DroppedFrames": 0}),
        json!({"Event": "GuideStep", "Frame": 30, "Time": 42.5, "Mount": "Simulator", "dx": 0.2, "dy": -0.1, "RADistanceRaw": 0.15, "DECDistanceRaw": -0.05, "RADuration": 120, "RADirection": "East", "SNR": 35.2, "StarMass": 10233.0, "HFD": 2.3, "AvgDist": 0.2}),
        json!({"Event": "GuidingDithered", "dx": 1.5, "dy": -2.0}),
        json!({"Event": "ConfigurationChange"}),
    ]
}

#[rstest]
fn replay_is_deterministic(session_events: Vec<Value>) {
    let first = fold(&session_events);
    let second = fold(&session_events);
    assert_eq!(first, second);

    assert_eq!(first.phase, AppPhase::Guiding);
    assert!(first.calibration.calibrated);
    assert_eq!(first.calibration.mount.as_deref(), Some("Simulator"));
    assert_eq!(first.calibration.step, Some(3));
    assert_eq!(first.calibration.position, Some(Point { x: 324.5, y: 241.3 }));
    assert_eq!(first.settle.success, Some(true));
    assert!(!first.settle.in_progress);
    assert_eq!(first.looping.frame, Some(12));
    assert_eq!(first.star.selected, Some(Point { x: 320.5, y: 240.25 }));
    assert_eq!(first.last_dither, Some(DitherOffset { dx: 1.5, dy: -2.0 }));
    assert_eq!(first.configuration_changes, 1);
    let version = first.version.as_ref().expect("version");
    assert_eq!(version.version, "2.6.11");
    assert_eq!(version.msg_version, 1);
}

#[rstest]
fn order_matters_only_through_the_given_sequence(session_events: Vec<Value>) {
    let mut reordered = session_events;
    reordered.push(json!({"Event": "Paused"}));
    let paused = fold(&reordered);
    assert_eq!(paused.phase, AppPhase::Paused);

    reordered.push(json!({"Event": "Resumed"}));
    assert_eq!(fold(&reordered).phase, AppPhase::Guiding);
}

#[rstest]
#[case("Stopped", AppPhase::Stopped)]
#[case("Selected", AppPhase::Selected)]
#[case("Calibrating", AppPhase::Calibrating)]
#[case("Guiding", AppPhase::Guiding)]
#[case("LostLock", AppPhase::LostLock)]
#[case("Paused", AppPhase::Paused)]
#[case("Looping", AppPhase::Looping)]
fn app_state_sets_phase(#[case] name: &str, #[case] expected: AppPhase) {
    let state = fold(&[json!({"Event": "AppState", "State": name})]);
    assert_eq!(state.phase, expected);
}

#[rstest]
fn unknown_app_state_keeps_phase() {
    let guiding = fold(&[json!({"Event": "AppState", "State": "Guiding"})]);
    let after = reduce(
        guiding.clone(),
        &event(&json!({"Event": "AppState", "State": "Dancing"})),
    );
    assert_eq!(after, guiding);
}

#[rstest]
fn alert_leaves_state_unchanged() {
    let before = fold(&[json!({"Event": "StartGuiding"})]);
    let after = reduce(
        before.clone(),
        &event(&json!({"Event": "Alert", "Msg": "Dark library missing", "Type": "warning"})),
    );
    assert_eq!(after, before);
}

#[rstest]
fn unknown_event_name_is_a_warning() {
    let body = json!({"Event": "Teleported", "Where": "Mars"});
    let Value::Object(map) = body else {
        panic!("object");
    };
    let outcome = GuideEvent::decode(EventMessage {
        name: "Teleported".to_owned(),
        body: map,
    });
    assert!(matches!(outcome, Err(ProtocolDecodeWarning::UnknownEvent(name)) if name == "Teleported"));
}

#[rstest]
fn mistyped_payload_is_a_warning() {
    let body = json!({"Event": "LockPositionSet", "X": "left", "Y": 3});
    let Value::Object(map) = body else {
        panic!("object");
    };
    let outcome = GuideEvent::decode(EventMessage {
        name: "LockPositionSet".to_owned(),
        body: map,
    });
    assert!(matches!(
        outcome,
        Err(ProtocolDecodeWarning::EventPayload { ref event, .. }) if event == "LockPositionSet"
    ));
}

#[rstest]
#[case(json!({"Event": "SettleDone", "Status": 0}), Some(true), None)]
#[case(json!({"Event": "SettleDone", "Status": 1, "Error": "timed-out waiting for guider to settle"}), Some(false), Some("timed-out waiting for guider to settle"))]
fn settle_done_records_outcome(
    #[case] done: Value,
    #[case] success: Option<bool>,
    #[case] error: Option<&str>,
) {
    let state = fold(&[json!({"Event": "SettleBegin"}), done]);
    assert!(!state.settle.in_progress);
    assert_eq!(state.settle.success, success);
    assert_eq!(state.settle.error.as_deref(), error);
}

#[rstest]
fn settle_begin_clears_previous_outcome() {
    let state = fold(&[
        json!({"Event": "SettleDone", "Status": 1, "Error": "lost"}),
        json!({"Event": "SettleBegin"}),
    ]);
    assert!(state.settle.in_progress);
    assert_eq!(state.settle.success, None);
    assert_eq!(state.settle.error, None);
}

#[rstest]
fn guide_step_replaces_previous_step() {
    let state = fold(&[
        json!({"Event": "GuideStep", "Frame": 1, "dx": 1.0, "RADirection": "East", "RALimited": true}),
        json!({"Event": "GuideStep", "Frame": 2, "dx": 0.5}),
    ]);
    let step = state.guide_step.expect("guide step");
    assert_eq!(step.frame, 2);
    assert_eq!(step.dx.to_string(), "0.5");
    assert_eq!(step.ra_direction, None);
    assert!(!step.ra_limited);
}

#[rstest]
fn star_lost_then_guide_step_recovers() {
    let lost = fold(&[json!({"Event": "StarLost", "Frame": 9, "SNR": 2.1, "StarMass": 55.0, "AvgDist": 3.2, "Status": "star lost"})]);
    assert!(lost.star.lost);
    let details = lost.star.last_lost.as_ref().expect("details");
    assert_eq!(details.frame, 9);
    assert_eq!(details.status.as_deref(), Some("star lost"));

    let recovered = reduce(lost, &event(&json!({"Event": "GuideStep", "Frame": 10})));
    assert!(!recovered.star.lost);
    assert!(recovered.star.last_lost.is_some());
}

#[rstest]
fn calibration_failure_clears_calibrated_flag() {
    let state = fold(&[
        json!({"Event": "CalibrationComplete", "Mount": "Simulator"}),
        json!({"Event": "StartCalibration", "Mount": "Simulator"}),
        json!({"Event": "CalibrationFailed", "Reason": "star did not move enough"}),
    ]);
    assert!(!state.calibration.calibrated);
    assert_eq!(
        state.calibration.failure.as_deref(),
        Some("star did not move enough")
    );
    assert_eq!(state.phase, AppPhase::Stopped);
}

#[rstest]
fn calibration_flip_sets_flag() {
    let state = fold(&[json!({"Event": "CalibrationDataFlipped", "Mount": "Simulator"})]);
    assert!(state.calibration.flipped);
}

#[rstest]
#[case(AppPhase::Guiding, AppPhase::Stopped)]
#[case(AppPhase::Paused, AppPhase::Stopped)]
#[case(AppPhase::Looping, AppPhase::Looping)]
fn guiding_stopped_clears_only_guiding_phases(#[case] from: AppPhase, #[case] expected: AppPhase) {
    let state = GuidingState {
        phase: from,
        ..connected()
    };
    assert_eq!(reduce(state, &GuideEvent::GuidingStopped).phase, expected);
}

#[rstest]
fn lock_position_events_track_flags() {
    let state = fold(&[
        json!({"Event": "LockPositionLost"}),
        json!({"Event": "LockPositionShiftLimitReached"}),
    ]);
    assert!(state.star.lock_lost);
    assert!(state.star.shift_limit_reached);

    let reset = reduce(state, &event(&json!({"Event": "LockPositionSet", "X": 10.0, "Y": 20.0})));
    assert!(!reset.star.lock_lost);
    assert!(!reset.star.shift_limit_reached);
    assert_eq!(reset.star.lock_position, Some(Point { x: 10.0, y: 20.0 }));
}

#[rstest]
fn looping_stop_clears_flag_and_param_change_is_recorded() {
    let state = fold(&[
        json!({"Event": "LoopingExposures", "Frame": 3}),
        json!({"Event": "LoopingExposuresStopped"}),
        json!({"Event": "GuideParamChange", "Name": "Aggressiveness", "Value": 70}),
    ]);
    assert!(!state.looping.active);
    let change = state.last_param_change.expect("param change");
    assert_eq!(change.name, "Aggressiveness");
    assert_eq!(change.value, json!(70));
}

#[rstest]
fn disconnect_keeps_telemetry_but_clears_flags(session_events: Vec<Value>) {
    let mut state = fold(&session_events);
    state.connection.device_connected = true;
    let after = disconnected(state.clone());
    assert!(!after.connection.server_connected);
    assert!(!after.connection.device_connected);
    assert_eq!(after.phase, AppPhase::Stopped);
    assert_eq!(after.guide_step, state.guide_step);
}

#[rstest]
fn profile_results_update_state() {
    let profiles = json!([{"id": 1, "name": "Simulator"}, {"id": 2, "name": "Backyard"}]);
    let listed = apply_response(connected(), "get_profiles", None, &profiles);
    assert_eq!(listed.profiles.len(), 2);

    let selected = apply_response(listed, "set_profile", Some(&json!([2])), &json!(0));
    assert_eq!(
        selected.profile,
        Some(Profile {
            id: 2,
            name: "Backyard".to_owned(),
        })
    );
}

#[rstest]
#[case("set_connected", Some(json!([true])), json!(0))]
#[case("get_connected", None, json!(true))]
fn device_connection_results_update_flag(
    #[case] method: &str,
    #[case] params: Option<Value>,
    #[case] result: Value,
) {
    let state = apply_response(connected(), method, params.as_ref(), &result);
    assert!(state.connection.device_connected);
}

#[rstest]
fn exposure_equipment_and_cooler_results_update_state() {
    let exposed = apply_response(connected(), "set_exposure", Some(&json!([1500])), &json!(0));
    assert_eq!(exposed.exposure_ms, Some(1500));
    let read_back = apply_response(exposed, "get_exposure", None, &json!(2000));
    assert_eq!(read_back.exposure_ms, Some(2000));

    let equipment = json!({
        "camera": {"name": "Simulator", "connected": true},
        "mount": {"name": "On Camera", "connected": true},
        "AO": {"name": "AO-Simulator", "connected": false}
    });
    let equipped = apply_response(read_back, "get_current_equipment", None, &equipment);
    let ao = equipped.equipment.ao.as_ref().expect("ao");
    assert_eq!(ao.name, "AO-Simulator");
    assert!(!ao.connected);
    assert_eq!(equipped.equipment.rotator, None);

    let cooled = apply_response(
        equipped,
        "get_cooler_status",
        None,
        &json!({"temperature": -10.0, "coolerOn": true, "setpoint": -10.0, "power": 45.0}),
    );
    assert!(cooled.cooler.as_ref().expect("cooler").cooler_on);
}

#[rstest]
fn undecodable_or_unrelated_results_change_nothing() {
    let base = connected();
    assert_eq!(
        apply_response(base.clone(), "get_exposure", None, &json!("fast")),
        base
    );
    assert_eq!(
        apply_response(base.clone(), "get_star_image", None, &json!({"frame": 1})),
        base
    );
}

#[rstest]
fn store_publishes_only_changes() {
    let store = StateStore::default();
    let subscription = store.subscribe();

    assert!(store.apply(|_| connected()));
    assert!(!store.apply(|state| state));
    assert!(store.apply(|state| reduce(state, &GuideEvent::StartGuiding)));

    let first = subscription.try_next().expect("connected snapshot");
    assert!(first.connection.server_connected);
    let second = subscription.try_next().expect("guiding snapshot");
    assert_eq!(second.phase, AppPhase::Guiding);
    assert!(subscription.try_next().is_none());
    assert_eq!(store.snapshot().phase, AppPhase::Guiding);
}

#[rstest]
fn snapshots_are_immutable() {
    let store = StateStore::default();
    store.apply(|_| connected());
    let before = store.snapshot();
    store.apply(|state| reduce(state, &GuideEvent::Paused));
    assert_eq!(before.phase, AppPhase::Stopped);
    assert_eq!(store.snapshot().phase, AppPhase::Paused);
}

#[rstest]
fn snapshot_is_readable_while_update_runs() {
    let store = StateStore::default();
    store.apply(|_| connected());

    let changed = store.apply(|state| {
        let during = store.snapshot();
        assert_eq!(during.phase, AppPhase::Stopped);
        assert!(during.connection.server_connected);
        reduce(state, &GuideEvent::StartGuiding)
    });

    assert!(changed);
    assert_eq!(store.snapshot().phase, AppPhase::Guiding);
}

#[rstest]
fn dropped_subscribers_are_pruned() {
    let store = StateStore::default();
    let kept = store.subscribe();
    drop(store.subscribe());

    store.apply(|_| connected());
    assert!(kept.recv_timeout(Duration::from_millis(100)).is_some());
}
