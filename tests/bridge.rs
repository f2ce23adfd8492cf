// This is free and unencumbered software released into the public domain.

mod common;

use capture_bridge::{
    bridge::{MethodCall, MethodHandler},
    session::SessionState,
    shared::LifecycleEvent,
};
use common::{StillMode, harness, harness_with, jpeg};
use serde_json::{Value, json};

#[test]
fn lists_available_cameras() {
    let h = harness(StillMode::Manual);
    let handler = MethodHandler::new(h.directory.clone());

    let cameras = handler
        .handle(&MethodCall::without_arguments("availableCameras"))
        .unwrap();

    assert_eq!(
        cameras,
        json!([
            { "name": "0", "lensFacing": "back", "sensorOrientation": 90 },
            { "name": "1", "lensFacing": "front", "sensorOrientation": 270 },
        ])
    );
}

#[test]
fn initialize_take_picture_dispose_round() {
    let h = harness(StillMode::Immediate(jpeg(64, 48)));
    let handler = MethodHandler::new(h.directory.clone());

    let reply = handler
        .handle(&MethodCall::new(
            "initialize",
            json!({ "cameraName": "0", "resolutionPreset": "medium" }),
        ))
        .unwrap();
    assert_eq!(
        reply,
        json!({ "textureId": 100, "previewWidth": 640, "previewHeight": 480 })
    );

    let dest = h.temp.path().join("shot.jpg");
    let reply = handler
        .handle(&MethodCall::new(
            "takePicture",
            json!({ "path": dest.to_str().unwrap() }),
        ))
        .unwrap();
    assert_eq!(reply, Value::String(dest.to_string_lossy().into_owned()));
    assert!(dest.exists());

    for _ in 0..2 {
        let reply = handler
            .handle(&MethodCall::without_arguments("dispose"))
            .unwrap();
        assert_eq!(reply, Value::Null);
    }
    assert_eq!(h.directory.state(), SessionState::Closed);
}

#[test]
fn permission_error_has_stable_code() {
    let h = harness_with(StillMode::Manual, false, |c| c);
    let handler = MethodHandler::new(h.directory.clone());

    let err = handler
        .handle(&MethodCall::new(
            "initialize",
            json!({ "cameraName": "0", "resolutionPreset": "high" }),
        ))
        .unwrap_err();

    assert_eq!(err.code, "cameraPermission");
    assert!(!err.message.is_empty());
}

#[test]
fn bad_arguments_are_illegal_argument_errors() {
    let h = harness(StillMode::Manual);
    let handler = MethodHandler::new(h.directory.clone());

    for arguments in [
        json!({ "cameraName": "0" }),
        json!({ "cameraName": 0, "resolutionPreset": "high" }),
        json!({ "cameraName": "0", "resolutionPreset": "gigantic" }),
        json!({ "cameraName": "nope", "resolutionPreset": "high" }),
    ] {
        let err = handler
            .handle(&MethodCall::new("initialize", arguments.clone()))
            .unwrap_err();
        assert_eq!(err.code, "IllegalArgumentException", "{arguments}");
    }

    let err = handler
        .handle(&MethodCall::without_arguments("takePicture"))
        .unwrap_err();
    assert_eq!(err.code, "IllegalArgumentException");
}

#[test]
fn unknown_methods_succeed_without_effect() {
    let h = harness(StillMode::Manual);
    let handler = MethodHandler::new(h.directory.clone());
    handler
        .handle(&MethodCall::new(
            "initialize",
            json!({ "cameraName": "1", "resolutionPreset": "low" }),
        ))
        .unwrap();

    let reply = handler
        .handle(&MethodCall::new("startVideoRecording", json!({ "path": "/tmp/x.mp4" })))
        .unwrap();

    assert_eq!(reply, Value::Null);
    assert_eq!(h.directory.state(), SessionState::Open);
}

#[test]
fn lifecycle_signals_reach_the_session() {
    let h = harness(StillMode::Manual);
    let handler = MethodHandler::new(h.directory.clone());
    handler
        .handle(&MethodCall::new(
            "initialize",
            json!({ "cameraName": "0", "resolutionPreset": "high" }),
        ))
        .unwrap();

    handler.lifecycle(LifecycleEvent::Background).unwrap();
    assert_eq!(h.directory.state(), SessionState::Suspended);

    h.manager.fail_open(true);
    let err = handler.lifecycle(LifecycleEvent::Foreground).unwrap_err();
    assert_eq!(err.code, "CameraAccess");
    assert_eq!(h.directory.state(), SessionState::Closed);
}
