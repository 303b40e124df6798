use crowdmap::{Config, ConfigError, DetectorConfig, Error, FailurePolicy, FrameSize, Roi};
use serial_test::serial;

const VARS: &[&str] = &[
    "CROWDMAP_ROI",
    "CROWDMAP_CALIBRATION",
    "CROWDMAP_TARGET_FPS",
    "CROWDMAP_TARGET_SIZE",
    "CROWDMAP_INTERVAL_SECONDS",
    "CROWDMAP_ON_DETECTION_ERROR",
    "CROWDMAP_WORKERS",
    "YOLO_MODEL",
    "YOLO_CONFIDENCE",
    "YOLO_INPUT_SIZE",
    "YOLO_IOU_THRESHOLD",
];

fn reset() {
    for var in VARS {
        std::env::remove_var(var);
    }
}

fn set_required() {
    std::env::set_var("CROWDMAP_ROI", "200,300,1720,900");
    std::env::set_var(
        "CROWDMAP_CALIBRATION",
        "30.268290,-97.776875,30.265068,-97.765652,1920,1080",
    );
}

#[test]
#[serial]
fn config_from_env_defaults() {
    reset();
    set_required();
    let cfg = Config::from_env().unwrap();
    assert_eq!(cfg.pipeline.roi, Roi::new(200, 300, 1720, 900).unwrap());
    assert_eq!(cfg.pipeline.calibration.frame_width, 1920);
    assert_eq!(cfg.pipeline.target_fps, 2.0);
    assert_eq!(cfg.pipeline.target_size, FrameSize::new(1280, 720));
    assert_eq!(cfg.pipeline.interval_seconds, 1.0);
    assert_eq!(cfg.pipeline.confidence, 0.05);
    assert_eq!(cfg.pipeline.on_detection_error, FailurePolicy::Skip);
    assert_eq!(cfg.workers, 1);
    assert_eq!(cfg.detector.model_path, "yolov8s.onnx");
    assert_eq!(cfg.detector.input_size, 640);
}

#[test]
#[serial]
fn config_from_env_overrides() {
    reset();
    set_required();
    std::env::set_var("CROWDMAP_TARGET_FPS", "5");
    std::env::set_var("CROWDMAP_TARGET_SIZE", "640x360");
    std::env::set_var("CROWDMAP_INTERVAL_SECONDS", "0.5");
    std::env::set_var("CROWDMAP_ON_DETECTION_ERROR", "abort");
    std::env::set_var("CROWDMAP_WORKERS", "4");
    std::env::set_var("YOLO_MODEL", "people.onnx");
    std::env::set_var("YOLO_CONFIDENCE", "0.25");
    let cfg = Config::from_env().unwrap();
    assert_eq!(cfg.pipeline.target_fps, 5.0);
    assert_eq!(cfg.pipeline.target_size, FrameSize::new(640, 360));
    assert_eq!(cfg.pipeline.interval_seconds, 0.5);
    assert_eq!(cfg.pipeline.on_detection_error, FailurePolicy::Abort);
    assert_eq!(cfg.pipeline.confidence, 0.25);
    assert_eq!(cfg.workers, 4);
    assert_eq!(cfg.detector.model_path, "people.onnx");
    reset();
}

#[test]
#[serial]
fn config_requires_roi_and_calibration() {
    reset();
    let err = Config::from_env().unwrap_err();
    assert!(matches!(
        err,
        Error::Config(ConfigError::Missing("CROWDMAP_ROI"))
    ));

    std::env::set_var("CROWDMAP_ROI", "200,300,1720,900");
    let err = Config::from_env().unwrap_err();
    assert!(matches!(
        err,
        Error::Config(ConfigError::Missing("CROWDMAP_CALIBRATION"))
    ));
    reset();
}

#[test]
#[serial]
fn config_rejects_inverted_roi() {
    reset();
    set_required();
    std::env::set_var("CROWDMAP_ROI", "1720,300,200,900");
    assert!(Config::from_env().unwrap_err().is_invalid_roi());
    reset();
}

#[test]
#[serial]
fn config_rejects_garbage_numbers() {
    reset();
    set_required();
    std::env::set_var("CROWDMAP_TARGET_FPS", "fast");
    assert!(matches!(
        Config::from_env(),
        Err(Error::Config(ConfigError::InvalidNumber(_)))
    ));
    std::env::remove_var("CROWDMAP_TARGET_FPS");
    std::env::set_var("CROWDMAP_ON_DETECTION_ERROR", "retry");
    assert!(matches!(
        Config::from_env(),
        Err(Error::Config(ConfigError::UnknownPolicy(_)))
    ));
    reset();
}

#[test]
#[serial]
fn config_rejects_unusable_detector_settings() {
    for (var, value) in [
        ("YOLO_CONFIDENCE", "NaN"),
        ("YOLO_CONFIDENCE", "1.5"),
        ("YOLO_IOU_THRESHOLD", "-0.2"),
    ] {
        reset();
        set_required();
        std::env::set_var(var, value);
        assert!(
            matches!(
                Config::from_env(),
                Err(Error::Config(ConfigError::OutOfRange { name, .. })) if name == var
            ),
            "{var}={value} should be rejected"
        );
    }

    reset();
    set_required();
    std::env::set_var("YOLO_INPUT_SIZE", "0");
    assert!(matches!(
        DetectorConfig::from_env(),
        Err(ConfigError::NotPositive {
            name: "YOLO_INPUT_SIZE",
            ..
        })
    ));
    reset();
}
