use ripstation::{
    config::{AudioFormat, Config, SubmissionMode},
    error::{ErrorKind, RunError},
    job::{CarrierJob, CarrierRef, SubmissionError},
};

#[test]
fn parse_example_config() {
    let raw = include_str!("../ripstation.example.toml");
    let cfg: Config = toml::from_str(raw).expect("parse TOML");
    assert!(cfg.station.timeout_seconds >= 1);
    assert!(!cfg.station.drive.is_empty());
    assert!(!cfg.paths.root_dir.is_empty());
    assert_eq!(cfg.audio.format, AudioFormat::Flac);
    assert!(cfg.tools.imager.args.iter().any(|a| a == "{output}"));
}

#[test]
fn partial_config_falls_back_to_defaults() {
    let raw = r#"
[station]
drive = "/dev/sr1"
timeout_seconds = 60

[audio]
format = "wav"

[tools.robot]
exe = "/opt/loader/bin/driver"
"#;
    let cfg: Config = toml::from_str(raw).expect("parse TOML");
    assert_eq!(cfg.station.drive, "/dev/sr1");
    assert_eq!(cfg.audio.format, AudioFormat::Wav);
    assert_eq!(cfg.submission.mode, SubmissionMode::Title);
    assert_eq!(cfg.tools.robot.exe, "/opt/loader/bin/driver");
    assert!(!cfg.tools.robot.load_args.is_empty());
    assert_eq!(cfg.tools.cd_info.exe, "cd-info");
}

#[test]
fn zero_timeout_is_rejected() {
    let mut cfg = Config::default();
    cfg.station.timeout_seconds = 0;
    assert!(matches!(cfg.validate(), Err(RunError::InvalidConfig(_))));
}

#[cfg(unix)]
#[test]
fn missing_drive_is_reported_at_startup() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = Config::default();
    cfg.station.drive = dir.path().join("sr9").display().to_string();
    cfg.paths.root_dir = dir.path().display().to_string();
    cfg.paths.temp_dir = dir.path().display().to_string();
    cfg.tools.robot.exe = "sh".into();
    for tool in [
        &mut cfg.tools.cd_info,
        &mut cfg.tools.imager,
        &mut cfg.tools.ripper,
        &mut cfg.tools.encoder,
        &mut cfg.tools.verifier,
    ] {
        tool.exe = "sh".into();
    }

    let err = cfg.validate().unwrap_err();
    assert!(matches!(err, RunError::DriveNotFound { .. }));
    assert_eq!(err.kind(), Some(ErrorKind::DriveNotFound));

    std::fs::write(dir.path().join("sr9"), b"").unwrap();
    cfg.validate().unwrap();
}

#[test]
fn unresolvable_tool_is_invalid_config() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = Config::default();
    cfg.paths.root_dir = dir.path().display().to_string();
    cfg.paths.temp_dir = dir.path().display().to_string();
    cfg.tools.robot.exe = "/nonexistent/loader-driver".into();

    let err = cfg.validate().unwrap_err();
    assert!(matches!(err, RunError::InvalidConfig(ref m) if m.contains("tools.robot")));
}

#[test]
fn submission_is_validated() {
    assert_eq!(
        CarrierJob::new(CarrierRef::Ppn("123456789".into()), 0).unwrap_err(),
        SubmissionError::InvalidVolume
    );
    assert_eq!(
        CarrierJob::new(CarrierRef::Title("   ".into()), 1).unwrap_err(),
        SubmissionError::EmptyIdentifier
    );

    // Decomposed "é" is stored composed.
    let job = CarrierJob::new(CarrierRef::Title("  Caf\u{0065}\u{0301}  ".into()), 3).unwrap();
    assert_eq!(job.title(), "Caf\u{00e9}");
    assert_eq!(job.ppn(), "");
    assert_eq!(job.volume_no, 3);
    assert_eq!(job.success, None);
}

#[test]
fn job_ids_are_unique() {
    let a = CarrierJob::new(CarrierRef::Ppn("1".into()), 1).unwrap();
    let b = CarrierJob::new(CarrierRef::Ppn("1".into()), 1).unwrap();
    assert_ne!(a.job_id, b.job_id);
}
