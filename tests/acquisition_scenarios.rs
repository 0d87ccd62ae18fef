//! End-to-end exposure scenarios against the simulated SDK.
//!
//! The mock runs on a virtual clock, so every wait here is driven by a
//! sleeper that advances the mock instead of the calling thread.

use std::time::Duration;

use fli_capture::mock::{MockCall, StatusReporting, TestPattern};
use fli_capture::validation::{validate_dark, validate_ramp, validate_row_sequence};
use fli_capture::{
    list_devices, AcquisitionController, BitDepth, CameraError, CameraState, CancelToken, Device,
    DeviceClass, DeviceStatus, Domain, ExposureConfig, FrameType, ImageArea, MockSdk,
    ReadoutGeometry, Transport, WaitOptions,
};

const CAMERA: Domain = Domain::new(Transport::Usb, DeviceClass::Camera);

#[test]
fn test_full_frame_capture() {
    let full = ImageArea::new(0, 0, 3072, 3072);
    let sdk = MockSdk::new().with_array_area(full);
    let mut device = Device::open(&sdk, "usb:0", CAMERA).expect("open should succeed");
    let mut controller = AcquisitionController::new(&mut device);

    let config = ExposureConfig::new(full, Duration::from_secs(2));
    controller.configure(&config).expect("configure should succeed");
    controller.trigger().expect("trigger should succeed");

    let mut slept = Duration::ZERO;
    let readiness = controller
        .wait_until_ready_with(&WaitOptions::default(), |d| {
            slept += d;
            sdk.advance(d);
        })
        .expect("wait should succeed");
    assert!(readiness.ready);
    assert!(readiness.status.data_ready());
    assert!(slept >= Duration::from_secs(2), "waited only {slept:?}");

    let image = controller.grab_image().expect("grab should succeed");
    assert_eq!(image.as_bytes().len(), 18_874_368);
    validate_ramp(&image).expect("frame should hold the test ramp");
    controller.end_exposure().expect("end should succeed");

    assert_eq!(
        sdk.count_calls(|c| matches!(c, MockCall::GrabFrame { .. })),
        1
    );
}

#[test]
fn test_unknown_status_waits_out_countdown() {
    let sdk = MockSdk::new();
    let mut device = Device::open(&sdk, "usb:0", CAMERA).expect("open should succeed");
    sdk.script_status([DeviceStatus::UNKNOWN, DeviceStatus::UNKNOWN]);
    sdk.script_remaining([250, 0]);

    let controller = AcquisitionController::new(&mut device);
    let mut sleeps = Vec::new();
    let readiness = controller
        .wait_until_ready_with(&WaitOptions::default(), |d| sleeps.push(d))
        .expect("wait should succeed");

    assert!(readiness.ready);
    assert!(readiness.status.is_unknown());
    assert_eq!(sleeps.len(), 1);
    assert!(sleeps.iter().all(|d| *d <= Duration::from_millis(250)));
}

#[test]
fn test_unknown_reporting_row_capture() {
    let area = ImageArea::new(4, 2, 260, 130);
    let sdk = MockSdk::new()
        .with_array_area(ImageArea::new(0, 0, 512, 512))
        .with_reporting(StatusReporting::AlwaysUnknown);
    let mut device = Device::open(&sdk, "usb:0", CAMERA).expect("open should succeed");
    let mut controller = AcquisitionController::new(&mut device);

    controller
        .configure(&ExposureConfig::new(area, Duration::from_millis(700)))
        .expect("configure should succeed");
    controller.trigger().expect("trigger should succeed");
    controller
        .wait_until_ready_with(&WaitOptions::default(), |d| sdk.advance(d))
        .expect("wait should succeed");

    let rows: Vec<Vec<u8>> = controller
        .drain_rows()
        .expect("drain should start")
        .collect::<Result<_, _>>()
        .expect("every row should transfer");
    let geometry = ReadoutGeometry::new(256, 128, BitDepth::Sixteen);
    validate_row_sequence(&rows, &geometry).expect("rows should follow the ramp");
    assert_eq!(
        sdk.count_calls(|c| matches!(c, MockCall::GrabRow { width: 256, len: 512 })),
        128
    );
}

#[test]
fn test_dark_frame_is_empty() {
    let area = ImageArea::new(0, 0, 200, 100);
    let sdk = MockSdk::new().with_pattern(TestPattern::Solid(4000));
    let mut device = Device::open(&sdk, "usb:0", CAMERA).expect("open should succeed");
    let mut controller = AcquisitionController::new(&mut device);

    let config = ExposureConfig::new(area, Duration::ZERO).with_frame_type(FrameType::Dark);
    controller.configure(&config).expect("configure should succeed");
    controller.trigger().expect("trigger should succeed");
    controller
        .wait_until_ready_with(&WaitOptions::default(), |d| sdk.advance(d))
        .expect("wait should succeed");
    let image = controller.grab_image().expect("grab should succeed");

    validate_dark(&image, 0).expect("dark frame should be empty");
}

#[test]
fn test_cancel_mid_exposure_returns_to_idle() {
    let sdk = MockSdk::new();
    let mut device = Device::open(&sdk, "usb:0", CAMERA).expect("open should succeed");
    let mut controller = AcquisitionController::new(&mut device);

    controller
        .configure(&ExposureConfig::new(
            ImageArea::new(0, 0, 64, 64),
            Duration::from_secs(30),
        ))
        .expect("configure should succeed");
    controller.trigger().expect("trigger should succeed");
    sdk.advance(Duration::from_secs(5));

    let before = controller.is_ready().expect("query should succeed");
    assert!(!before.ready);
    assert_eq!(before.status.camera_state(), Some(CameraState::Exposing));

    controller.cancel_exposure().expect("cancel should succeed");
    let after = controller.is_ready().expect("query should succeed");
    assert_eq!(after.status.camera_state(), Some(CameraState::Idle));
    assert_eq!(after.remaining_ms, 0);
}

#[test]
fn test_cancel_token_stops_wait() {
    let sdk = MockSdk::new();
    let mut device = Device::open(&sdk, "usb:0", CAMERA).expect("open should succeed");
    let mut controller = AcquisitionController::new(&mut device);
    controller
        .configure(&ExposureConfig::new(
            ImageArea::new(0, 0, 16, 16),
            Duration::from_secs(60),
        ))
        .expect("configure should succeed");
    controller.trigger().expect("trigger should succeed");

    let token = CancelToken::new();
    let options = WaitOptions::default().with_cancel(token.clone());
    let err = controller
        .wait_until_ready_with(&options, |_| token.cancel())
        .expect_err("wait should be cancelled");
    assert!(matches!(err, CameraError::Cancelled));
}

#[test]
fn test_short_transfer_is_reported() {
    let area = ImageArea::new(0, 0, 32, 8);
    let sdk = MockSdk::new();
    let mut device = Device::open(&sdk, "usb:0", CAMERA).expect("open should succeed");
    let mut controller = AcquisitionController::new(&mut device);
    controller
        .configure(&ExposureConfig::new(area, Duration::ZERO))
        .expect("configure should succeed");
    controller.trigger().expect("trigger should succeed");
    controller
        .wait_until_ready_with(&WaitOptions::default(), |d| sdk.advance(d))
        .expect("wait should succeed");

    sdk.short_transfer(64);
    let err = controller
        .grab_image()
        .expect_err("short transfer should fail");
    assert!(matches!(
        err,
        CameraError::TransferSizeMismatch {
            expected: 512,
            actual: 448
        }
    ));
}

#[test]
fn test_session_closes_handle_on_drop() {
    let sdk = MockSdk::new().with_entries(["usb:0;FLI Simulated Camera", "usb:1"]);
    let names = list_devices(&sdk, CAMERA).expect("list should succeed");
    assert_eq!(names.len(), 2);
    assert_eq!(names[1].model_name, None);

    {
        let first = Device::open(&sdk, &names[0].file_name, CAMERA).expect("open usb:0");
        let _second = Device::open(&sdk, &names[1].file_name, CAMERA).expect("open usb:1");
        assert!(first.is_open());
        assert_eq!(sdk.open_handles(), 2);
    }
    assert_eq!(sdk.open_handles(), 0);
    assert_eq!(sdk.count_calls(|c| *c == MockCall::Close), 2);
}

#[test]
fn test_filter_wheel_and_focuser() {
    let sdk = MockSdk::new()
        .with_filters(["L", "R", "G", "B"])
        .with_focuser_extent(5_000);

    let wheel_domain = Domain::new(Transport::Usb, DeviceClass::FilterWheel);
    let mut wheel = Device::open(&sdk, "usb:0", wheel_domain).expect("open wheel");
    assert_eq!(
        wheel.filter_names().expect("names"),
        vec!["L", "R", "G", "B"]
    );
    wheel.set_filter_pos(2).expect("move wheel");
    assert_eq!(wheel.filter_pos().expect("position"), 2);
    assert!(!wheel.filter_wheel_status().expect("status").at_home());
    wheel.close().expect("close wheel");

    let focuser_domain = Domain::new(Transport::Usb, DeviceClass::Focuser);
    let mut focuser = Device::open(&sdk, "usb:0", focuser_domain).expect("open focuser");
    focuser.move_to(1_200).expect("start move");
    assert!(focuser.is_moving().expect("moving"));
    assert!(focuser.focuser_status().expect("status").moving_out());
    sdk.settle_motion();
    assert_eq!(focuser.stepper_position().expect("position"), 1_200);
    assert!(!focuser.is_moving().expect("settled"));
}

#[test]
fn test_video_stream_then_single_exposure() {
    let area = ImageArea::new(0, 0, 128, 64);
    let sdk = MockSdk::new();
    let mut device = Device::open(&sdk, "usb:0", CAMERA).expect("open should succeed");
    let mut controller = AcquisitionController::new(&mut device);
    controller
        .configure(&ExposureConfig::new(area, Duration::from_millis(40)))
        .expect("configure should succeed");

    controller.start_video().expect("video should start");
    for _ in 0..5 {
        let frame = controller.grab_video_image().expect("video frame");
        assert_eq!(frame.as_bytes().len(), 128 * 64 * 2);
        validate_ramp(&frame).expect("video frame should hold the test ramp");
    }
    controller.stop_video().expect("video should stop");

    let image = controller
        .capture_with(
            &ExposureConfig::new(area, Duration::from_millis(40)),
            &WaitOptions::default(),
            |d| sdk.advance(d),
        )
        .expect("single exposure after video");
    validate_ramp(&image).expect("frame should hold the test ramp");
    assert_eq!(
        sdk.count_calls(|c| matches!(c, MockCall::GrabVideoFrame { .. })),
        5
    );
}

#[test]
fn test_timed_out_capture_leaves_camera_idle() {
    let sdk = MockSdk::new();
    let mut device = Device::open(&sdk, "usb:0", CAMERA).expect("open should succeed");
    let mut controller = AcquisitionController::new(&mut device);
    let config = ExposureConfig::new(ImageArea::new(0, 0, 32, 32), Duration::from_secs(120));
    let options = WaitOptions::default().with_timeout(Duration::from_secs(2));

    let err = controller
        .capture_with(&config, &options, |d| sdk.advance(d))
        .expect_err("capture should time out");
    assert!(matches!(err, CameraError::Timeout(_)));
    let after = controller.is_ready().expect("query should succeed");
    assert_eq!(after.status.camera_state(), Some(CameraState::Idle));

    controller.trigger().expect("a new exposure can start");
}
