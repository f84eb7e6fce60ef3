use ripstation::classify::{DriveReport, Rule, Track, TrackKind, classify};

fn report(kinds: &[TrackKind], sessions: u32) -> DriveReport {
    DriveReport {
        tracks: kinds
            .iter()
            .enumerate()
            .map(|(i, k)| Track {
                number: i as u32 + 1,
                kind: *k,
            })
            .collect(),
        session_count: sessions,
        ..Default::default()
    }
}

#[test]
fn two_audio_tracks_and_a_data_session_is_mixed_mode() {
    let r = report(&[TrackKind::Audio, TrackKind::Audio, TrackKind::Data], 2);
    let c = classify(&r);
    assert_eq!(c.rule, Rule::MixedMode);
    assert!(c.flags.contains_audio);
    assert!(c.flags.contains_data);
    assert!(c.flags.is_mixed_mode);
    assert!(!c.flags.is_cd_extra);
}

#[test]
fn all_audio_is_audio_only() {
    let c = classify(&report(&[TrackKind::Audio; 12], 1));
    assert_eq!(c.rule, Rule::Audio);
    assert!(c.flags.contains_audio);
    assert!(!c.flags.contains_data);
    assert!(!c.flags.is_mixed_mode);
}

#[test]
fn all_data_multisession_with_signature_is_cd_extra() {
    let mut r = report(&[TrackKind::Data, TrackKind::Data], 2);
    r.cd_extra_signature = true;
    let c = classify(&r);
    assert_eq!(c.rule, Rule::CdExtra);
    assert!(c.flags.is_cd_extra);
    assert!(c.flags.contains_audio);
    assert!(c.flags.contains_data);
}

#[test]
fn cd_extra_signature_on_single_session_is_plain_data() {
    let mut r = report(&[TrackKind::Data], 1);
    r.cd_extra_signature = true;
    let c = classify(&r);
    assert_eq!(c.rule, Rule::Data);
    assert!(c.flags.contains_data);
    assert!(!c.flags.is_cd_extra);
}

#[test]
fn interactive_marker_sets_cd_interactive() {
    let mut r = report(&[TrackKind::Interactive], 1);
    r.interactive_marker = true;
    let c = classify(&r);
    assert_eq!(c.rule, Rule::Interactive);
    assert!(c.flags.is_cd_interactive);
    assert!(c.flags.contains_data);
    assert!(!c.flags.contains_audio);
}

#[test]
fn plain_data_falls_through() {
    let c = classify(&report(&[TrackKind::Data], 1));
    assert_eq!(c.rule, Rule::Data);
    assert!(c.matched.is_empty());
    assert!(c.flags.contains_data);
    assert!(!c.flags.contains_audio);
}

#[test]
fn audio_plus_cd_i_is_mixed_mode_and_flagged_ambiguous() {
    let mut r = report(&[TrackKind::Audio, TrackKind::Interactive], 1);
    r.interactive_marker = true;
    let c = classify(&r);
    assert_eq!(c.rule, Rule::MixedMode);
    assert_eq!(c.matched, vec![Rule::MixedMode, Rule::Interactive]);
    assert!(c.is_ambiguous());
    assert!(!c.flags.is_cd_interactive);
}

#[test]
fn enhanced_cd_with_audio_tracks_stays_mixed_mode() {
    // Audio session plus trailing data session with the CD-Plus/Extra signature:
    // the track rule has priority.
    let mut r = report(&[TrackKind::Audio, TrackKind::Audio, TrackKind::Data], 2);
    r.cd_extra_signature = true;
    let c = classify(&r);
    assert_eq!(c.rule, Rule::MixedMode);
    assert!(c.flags.is_mixed_mode);
    assert!(!c.flags.is_cd_extra);
}

#[test]
fn classification_is_a_pure_function_of_the_report() {
    let mut r = report(&[TrackKind::Audio, TrackKind::Data, TrackKind::Data], 3);
    r.cd_extra_signature = true;
    let first = classify(&r);
    for _ in 0..10 {
        assert_eq!(classify(&r), first);
    }
    assert_eq!(classify(&r.clone()), first);
}
