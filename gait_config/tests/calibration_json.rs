use gait_config::{load_calibration_json, save_calibration_json};
use gait_core::types::{DeviceCalibration, SensorCalibration};

#[test]
fn round_trips_a_non_default_calibration() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("device.json");

    let sensor1 = SensorCalibration {
        acc_bias: [0.1, -0.2, 0.05],
        acc_scale: [1.02, 0.98, 1.01],
        gyro_bias: [0.3, 0.0, -0.1],
        gyro_scale: [1.0; 3],
        rotation_matrix: Some([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]),
    };
    let sensor2 = SensorCalibration::default();

    let cal = DeviceCalibration {
        id: "thigh-shank-01".into(),
        last_update: "2026-07-01".into(),
        sensor1,
        sensor2,
    };

    save_calibration_json(&path, &cal).expect("save calibration");
    let loaded = load_calibration_json(&path).expect("load calibration");

    assert_eq!(loaded.id, cal.id);
    assert_eq!(loaded.sensor1.acc_bias, cal.sensor1.acc_bias);
    assert_eq!(loaded.sensor1.rotation_matrix, cal.sensor1.rotation_matrix);
}

#[test]
fn missing_sensor_key_errors_instead_of_panicking() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.json");
    std::fs::write(&path, r#"{"id":"d","last_update":"2026-01-01"}"#).unwrap();
    let err = load_calibration_json(&path).expect_err("missing sensor1/sensor2 should error");
    assert!(format!("{err}").contains("decode calibration blob"));
}

#[test]
fn unreadable_path_errors_instead_of_panicking() {
    let path = std::path::Path::new("/nonexistent/path/device.json");
    let err = load_calibration_json(path).expect_err("missing file should error");
    assert!(format!("{err}").contains("read calibration blob"));
}
