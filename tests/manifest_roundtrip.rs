use ripstation::{
    error::{ErrorKind, RunError},
    job::{CarrierJob, CarrierRef, JobState, MediaFlags},
    manifest::{HEADER, ManifestRecord, ManifestWriter, read_manifest},
};

fn finished_job(carrier: CarrierRef, volume: u32, success: bool) -> CarrierJob {
    let mut job = CarrierJob::new(carrier, volume).unwrap();
    job.media = MediaFlags {
        contains_audio: true,
        contains_data: true,
        is_mixed_mode: true,
        ..Default::default()
    };
    job.classified = true;
    job.volume_id = Some("ENHANCED_CD".into());
    job.status = if success { JobState::Done } else { JobState::Failed };
    job.success = Some(success);
    job
}

fn succeeded(job: &CarrierJob) -> bool {
    job.success == Some(true)
}

#[test]
fn header_is_written_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("manifest.csv");
    drop(ManifestWriter::open(&path).unwrap());
    drop(ManifestWriter::open(&path).unwrap());

    let raw = std::fs::read_to_string(&path).unwrap();
    assert_eq!(raw, format!("{}\n", HEADER.join(",")));
}

#[test]
fn rows_round_trip_in_completion_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("manifest.csv");
    let jobs = vec![
        finished_job(CarrierRef::Title("Plain title".into()), 1, true),
        finished_job(
            CarrierRef::Title("Bach, J.S. \"Goldberg\" variations".into()),
            2,
            false,
        ),
        finished_job(CarrierRef::Ppn("144082667".into()), 3, true),
    ];

    let mut writer = ManifestWriter::open(&path).unwrap();
    for job in &jobs {
        writer.append(job, succeeded(job)).unwrap();
    }
    drop(writer);

    let records = read_manifest(&path).unwrap();
    let expected: Vec<ManifestRecord> = jobs
        .iter()
        .map(|j| ManifestRecord::from_job(j, succeeded(j)))
        .collect();
    assert_eq!(records, expected);
    assert_eq!(records[1].title, "Bach, J.S. \"Goldberg\" variations");
    assert_eq!(records[2].ppn, "144082667");
    assert_eq!(records[2].title, "");
    assert!(records.iter().all(|r| r.to_row().len() == HEADER.len()));
}

#[test]
fn reopened_manifest_appends_without_rewriting() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("manifest.csv");

    let first = finished_job(CarrierRef::Title("one".into()), 1, true);
    ManifestWriter::open(&path).unwrap().append(&first, true).unwrap();
    let before = std::fs::read_to_string(&path).unwrap();

    let second = finished_job(CarrierRef::Title("two".into()), 1, false);
    ManifestWriter::open(&path).unwrap().append(&second, false).unwrap();
    let after = std::fs::read_to_string(&path).unwrap();

    assert!(after.starts_with(&before));
    let records = read_manifest(&path).unwrap();
    assert_eq!(records.len(), 2);
    assert!(records[0].success);
    assert!(!records[1].success);
}

#[test]
fn success_and_flags_are_written_capitalised() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("manifest.csv");
    let job = finished_job(CarrierRef::Title("x".into()), 4, false);
    ManifestWriter::open(&path).unwrap().append(&job, false).unwrap();

    let raw = std::fs::read_to_string(&path).unwrap();
    let row = raw.lines().nth(1).unwrap();
    assert!(row.ends_with(",4,x,ENHANCED_CD,False,True,True,False,True,False"));
}

#[test]
fn unwritable_manifest_is_a_run_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("manifest.csv");
    let mut writer = ManifestWriter::open(&path).unwrap();
    assert_eq!(writer.path(), path.as_path());

    std::fs::remove_file(&path).unwrap();
    std::fs::create_dir(&path).unwrap();

    let job = finished_job(CarrierRef::Title("lost".into()), 1, true);
    let err = writer.append(&job, true).unwrap_err();
    assert!(matches!(err, RunError::ManifestWriteFailed { .. }));
    assert_eq!(err.kind(), Some(ErrorKind::ManifestWriteFailed));
}
