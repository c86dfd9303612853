use gait_config::{load_toml, Config, SessionMetadata};

#[test]
fn rejects_inverted_cadence_band() {
    let toml_src = r#"
        [detection]
        walking_cadence_min = 140.0
        walking_cadence_max = 80.0
    "#;
    let cfg = load_toml(toml_src).expect("parse TOML");
    let err = cfg.validate().expect_err("should reject inverted cadence band");
    assert!(format!("{err}").contains("walking_cadence_max"));
}

#[test]
fn rejects_zero_prefilter_cutoff() {
    let toml_src = r#"
        [filter]
        prefilter_cutoff_hz = 0.0
    "#;
    let cfg = load_toml(toml_src).expect("parse TOML");
    let err = cfg.validate().expect_err("should reject zero cutoff");
    assert!(format!("{err}").contains("prefilter_cutoff_hz"));
}

#[test]
fn accepts_fully_overridden_config() {
    let toml_src = r#"
        [detector]
        height_std_mult = 1.2
        outlier_zscore = 3.0

        [filter]
        prefilter_cutoff_hz = 18.0
        cutoff_walking_hz = 6.5

        [detection]
        stairs_cadence_min = 55.0
        stairs_cadence_max = 95.0
    "#;
    let cfg: Config = load_toml(toml_src).expect("parse TOML");
    cfg.validate().expect("valid config should pass");
    assert_eq!(cfg.detector.outlier_zscore, 3.0);
    assert_eq!(cfg.filter.cutoff_walking_hz, 6.5);
}

#[test]
fn session_metadata_accepts_plausible_height() {
    let meta = SessionMetadata {
        height_m: Some(1.75),
        session_id: Some("abc123".into()),
        ..Default::default()
    };
    meta.validate().expect("plausible metadata should pass");
}
