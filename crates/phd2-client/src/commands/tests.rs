//! Typed command wrappers against a scripted server.

use rstest::{fixture, rstest};
use serde_json::{Value, json};

use super::*;
use crate::errors::CommandError;
use crate::state::Point;
use crate::tests::support::fake_server::{FakeServer, failure, success};

fn canned(method: &str) -> Value {
    match method {
        "get_profiles" => json!([{"id": 1, "name": "Simulator"}, {"id": 2, "name": "Rig"}]),
        "get_profile" => json!({"id": 2, "name": "Rig"}),
        "get_connected" | "get_calibrated" | "get_use_subframes" => json!(true),
        "get_exposure" => json!(2000),
        "get_exposure_durations" => json!([500, 1000, 2000]),
        "get_camera_frame_size" => json!([1280, 960]),
        "save_image" => json!({"filename": "/tmp/phd2_save.fit"}),
        "get_ccd_temperature" => json!({"temperature": -9.5}),
        "get_pixel_scale" => Value::Null,
        "get_app_state" => json!("Looping"),
        "get_calibration_data" => json!({"calibrated": true, "xAngle": 12.5, "yParity": "-"}),
        "get_star_image" => json!({
            "frame": 7,
            "width": 15,
            "height": 15,
            "star_pos": [7.5, 7.0],
            "pixels": "AAAA",
        }),
        _ => json!(0),
    }
}

#[fixture]
fn server() -> FakeServer {
    FakeServer::answering(canned).expect("start fake server")
}

fn connect(server: &FakeServer) -> Session {
    Session::connect(&server.config()).expect("connect to fake server")
}

fn last_request(server: &FakeServer) -> Value {
    server.requests().pop().expect("a request was sent")
}

#[rstest]
fn profiles_decode_and_reach_the_state(server: FakeServer) {
    let session = connect(&server);

    let profiles = session.get_profiles().expect("get_profiles");

    assert_eq!(profiles.len(), 2);
    assert_eq!(profiles.first().map(|profile| profile.name.as_str()), Some("Simulator"));
    assert_eq!(session.snapshot().profiles, profiles);
}

#[rstest]
fn set_profile_rejects_ids_missing_from_the_known_list(server: FakeServer) {
    let session = connect(&server);
    session.get_profiles().expect("get_profiles");

    let error = session.set_profile(9).expect_err("unknown profile");

    assert!(matches!(error, GuiderError::InvalidArgument { method: "set_profile", .. }));
    assert_eq!(server.requests().len(), 1, "nothing sent for an invalid id");
}

#[rstest]
fn set_profile_sends_known_id(server: FakeServer) {
    let session = connect(&server);
    session.get_profiles().expect("get_profiles");

    session.set_profile(2).expect("set_profile");

    let request = last_request(&server);
    assert_eq!(request["method"], "set_profile");
    assert_eq!(request["params"], json!([2]));
}

#[rstest]
#[case(0)]
#[case(-3)]
fn set_profile_rejects_non_positive_ids(server: FakeServer, #[case] id: i64) {
    let session = connect(&server);

    let error = session.set_profile(id).expect_err("invalid id");

    assert!(matches!(error, GuiderError::InvalidArgument { .. }));
    assert!(server.requests().is_empty());
}

#[rstest]
fn zero_exposure_is_rejected_locally(server: FakeServer) {
    let session = connect(&server);

    let error = session.set_exposure(0).expect_err("zero exposure");

    assert!(matches!(error, GuiderError::InvalidArgument { method: "set_exposure", .. }));
    assert!(server.requests().is_empty());
}

#[rstest]
fn exposure_round_trip(server: FakeServer) {
    let session = connect(&server);

    session.set_exposure(1500).expect("set_exposure");
    let exposure = session.get_exposure().expect("get_exposure");
    let durations = session.get_exposure_durations().expect("durations");

    assert_eq!(exposure, 2000);
    assert_eq!(durations, vec![500, 1000, 2000]);
    let methods: Vec<Value> = server
        .requests()
        .iter()
        .map(|request| request["method"].clone())
        .collect();
    assert_eq!(
        methods,
        vec![json!("set_exposure"), json!("get_exposure"), json!("get_exposure_durations")]
    );
    assert_eq!(session.snapshot().exposure_ms, Some(2000));
}

#[rstest]
fn guide_sends_settle_object(server: FakeServer) {
    let session = connect(&server);
    let settle = SettleParams {
        pixels: 2.0,
        time: 8,
        timeout: 40,
    };

    session.guide(&settle, true, None).expect("guide");

    let request = last_request(&server);
    assert_eq!(request["method"], "guide");
    assert_eq!(
        request["params"],
        json!({"settle": {"pixels": 2.0, "time": 8, "timeout": 40}, "recalibrate": true})
    );
}

#[rstest]
fn guide_forwards_region_of_interest(server: FakeServer) {
    let session = connect(&server);
    let roi = Roi {
        x: 10,
        y: 20,
        width: 100,
        height: 80,
    };

    session
        .guide(&SettleParams::default(), false, Some(roi))
        .expect("guide");

    assert_eq!(last_request(&server)["params"]["roi"], json!([10, 20, 100, 80]));
}

#[rstest]
#[case(SettleParams { pixels: 0.0, time: 10, timeout: 60 })]
#[case(SettleParams { pixels: 1.5, time: 10, timeout: 0 })]
#[case(SettleParams { pixels: 1.5, time: 90, timeout: 60 })]
#[case(SettleParams { pixels: f64::NAN, time: 10, timeout: 60 })]
fn guide_rejects_inconsistent_settle(server: FakeServer, #[case] settle: SettleParams) {
    let session = connect(&server);

    let error = session.guide(&settle, false, None).expect_err("bad settle");

    assert!(matches!(error, GuiderError::InvalidArgument { method: "guide", .. }));
    assert!(server.requests().is_empty());
}

#[rstest]
fn guide_rejects_empty_region(server: FakeServer) {
    let session = connect(&server);
    let roi = Roi {
        x: 0,
        y: 0,
        width: 0,
        height: 50,
    };

    let error = session
        .guide(&SettleParams::default(), false, Some(roi))
        .expect_err("empty region");

    assert!(matches!(error, GuiderError::InvalidArgument { .. }));
}

#[rstest]
fn dither_sends_named_parameters(server: FakeServer) {
    let session = connect(&server);

    session
        .dither(3.0, true, &SettleParams::default())
        .expect("dither");

    let request = last_request(&server);
    assert_eq!(request["method"], "dither");
    assert_eq!(request["params"]["amount"], json!(3.0));
    assert_eq!(request["params"]["raOnly"], json!(true));
    assert_eq!(request["params"]["settle"]["timeout"], json!(60));
}

#[rstest]
#[case(0.0)]
#[case(-1.0)]
#[case(f64::INFINITY)]
fn dither_rejects_non_positive_amounts(server: FakeServer, #[case] amount: f64) {
    let session = connect(&server);

    let error = session
        .dither(amount, false, &SettleParams::default())
        .expect_err("bad amount");

    assert!(matches!(error, GuiderError::InvalidArgument { method: "dither", .. }));
    assert!(server.requests().is_empty());
}

#[rstest]
fn pause_variants_shape_their_parameters(server: FakeServer) {
    let session = connect(&server);

    session.set_paused(true, false).expect("pause");
    session.stop_looping().expect("full pause");
    session.set_paused(false, true).expect("resume");
    session.start_looping().expect("loop");

    let sent: Vec<(Value, Value)> = server
        .requests()
        .iter()
        .map(|request| (request["method"].clone(), request["params"].clone()))
        .collect();
    assert_eq!(
        sent,
        vec![
            (json!("set_paused"), json!([true])),
            (json!("set_paused"), json!([true, "full"])),
            (json!("set_paused"), json!([false])),
            (json!("loop"), json!([true])),
        ]
    );
}

#[rstest]
fn parameterless_commands_omit_params(server: FakeServer) {
    let session = connect(&server);

    session.flip_calibration().expect("flip");

    let request = last_request(&server);
    assert_eq!(request["method"], "flip_calibration");
    assert!(request.get("params").is_none());
}

#[rstest]
fn calibration_commands_name_their_target(server: FakeServer) {
    let session = connect(&server);

    let data = session
        .get_calibration_data(CalibrationTarget::Ao)
        .expect("calibration data");
    session
        .clear_calibration(ClearCalibrationTarget::Both)
        .expect("clear");

    assert!(data.calibrated);
    assert_eq!(data.x_angle, Some(12.5));
    assert_eq!(data.y_parity.as_deref(), Some("-"));
    let requests = server.requests();
    assert_eq!(requests[0]["params"], json!({"which": "AO"}));
    assert_eq!(requests[1]["params"], json!({"which": "both"}));
}

#[rstest]
fn camera_queries_decode(server: FakeServer) {
    let session = connect(&server);

    let frame = session.get_camera_frame_size().expect("frame size");
    let filename = session.save_image().expect("save image");
    let temperature = session.get_ccd_temperature().expect("temperature");
    let scale = session.get_pixel_scale().expect("pixel scale");
    let subframes = session.get_use_subframes().expect("subframes");
    let phase = session.get_app_state().expect("app state");

    assert_eq!(
        frame,
        FrameSize {
            width: 1280,
            height: 960
        }
    );
    assert_eq!(filename, "/tmp/phd2_save.fit");
    assert_eq!(temperature.to_string(), "-9.5");
    assert_eq!(scale, None);
    assert!(subframes);
    assert_eq!(phase, AppPhase::Looping);
}

#[rstest]
fn star_image_decodes_position(server: FakeServer) {
    let session = connect(&server);

    let image = session.get_star_image(Some(15)).expect("star image");

    assert_eq!(image.frame, 7);
    assert_eq!(image.star_pos, Point { x: 7.5, y: 7.0 });
    assert_eq!(last_request(&server)["params"], json!([15]));
}

#[rstest]
fn star_image_size_has_a_floor(server: FakeServer) {
    let session = connect(&server);

    let error = session.get_star_image(Some(14)).expect_err("too small");

    assert!(matches!(error, GuiderError::InvalidArgument { method: "get_star_image", .. }));
    assert!(server.requests().is_empty());
}

#[rstest]
fn remote_errors_become_rejections_with_a_hint() {
    let server = FakeServer::spawn(|request| vec![failure(request, 1, "cannot dither")])
        .expect("start fake server");
    let session = connect(&server);

    let error = session
        .dither(2.0, false, &SettleParams::default())
        .expect_err("rejected");

    match error {
        GuiderError::Rejected {
            method,
            hint,
            code,
            message,
        } => {
            assert_eq!(method, "dither");
            assert_eq!(hint, "guiding must be active");
            assert_eq!(code, 1);
            assert_eq!(message, "cannot dither");
        }
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[rstest]
fn mismatched_result_shape_is_reported() {
    let server = FakeServer::spawn(|request| vec![success(request, &json!("not a list"))])
        .expect("start fake server");
    let session = connect(&server);

    let error = session.get_profiles().expect_err("wrong shape");

    assert!(matches!(error, GuiderError::UnexpectedResult { method: "get_profiles", .. }));
    assert_eq!(error.method(), "get_profiles");
    assert!(!error.is_retryable());
}

#[rstest]
fn commands_on_a_disconnected_session_fail_fast(server: FakeServer) {
    let session = Session::new(&server.config());

    let error = session.get_connected().expect_err("not connected");

    assert!(matches!(
        error,
        GuiderError::Command(CommandError::NotConnected { .. })
    ));
    assert_eq!(error.method(), "get_connected");
}

#[rstest]
fn timeouts_are_retryable() {
    let server = FakeServer::spawn(|_| Vec::new()).expect("start fake server");
    let mut config = server.config();
    config.command_timeout_ms = 100;
    let session = Session::connect(&config).expect("connect");

    let error = session.get_connected().expect_err("no answer");

    assert!(error.is_retryable());
    assert_eq!(error.method(), "get_connected");
    assert!(matches!(
        error,
        GuiderError::Command(CommandError::Timeout { .. })
    ));
}
