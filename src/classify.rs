//! Disc-type classification.
//!
//! Parsing turns the disc-inspection tool's text report into a [`DriveReport`];
//! [`classify`] is a pure function of that report.

use crate::{error::JobError, job::MediaFlags};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackKind {
    Audio,
    Data,
    /// CD-i track; counts as data.
    Interactive,
}

impl TrackKind {
    pub fn is_data(self) -> bool {
        matches!(self, Self::Data | Self::Interactive)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub number: u32,
    pub kind: TrackKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveReport {
    pub tracks: Vec<Track>,
    pub session_count: u32,
    /// The analysis section named the disc CD-Plus/Extra.
    pub cd_extra_signature: bool,
    /// A CD-i track type or CD-i/CD-RTOS marker was seen.
    pub interactive_marker: bool,
    pub volume_id: Option<String>,
}

impl DriveReport {
    pub fn audio_tracks(&self) -> usize {
        self.tracks.iter().filter(|t| t.kind == TrackKind::Audio).count()
    }

    pub fn data_tracks(&self) -> usize {
        self.tracks.iter().filter(|t| t.kind.is_data()).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rule {
    MixedMode,
    Audio,
    CdExtra,
    Interactive,
    Data,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub flags: MediaFlags,
    /// The rule that decided the flags.
    pub rule: Rule,
    /// Every non-fallback rule whose condition held, in priority order. More than one
    /// entry means the disc is ambiguous under the rule ordering.
    pub matched: Vec<Rule>,
}

impl Classification {
    pub fn is_ambiguous(&self) -> bool {
        self.matched.len() > 1
    }
}

pub fn classify(report: &DriveReport) -> Classification {
    let any_audio = report.tracks.iter().any(|t| t.kind == TrackKind::Audio);
    let any_data = report.tracks.iter().any(|t| t.kind.is_data());
    let all_audio = !report.tracks.is_empty() && !any_data;
    let all_data = !report.tracks.is_empty() && !any_audio;

    let mut matched = Vec::new();
    if any_audio && any_data {
        matched.push(Rule::MixedMode);
    }
    if all_audio {
        matched.push(Rule::Audio);
    }
    if all_data && report.session_count > 1 && report.cd_extra_signature {
        matched.push(Rule::CdExtra);
    }
    if report.interactive_marker {
        matched.push(Rule::Interactive);
    }

    let rule = matched.first().copied().unwrap_or(Rule::Data);
    let flags = match rule {
        Rule::MixedMode => MediaFlags {
            contains_audio: true,
            contains_data: true,
            is_mixed_mode: true,
            ..Default::default()
        },
        Rule::Audio => MediaFlags {
            contains_audio: true,
            ..Default::default()
        },
        Rule::CdExtra => MediaFlags {
            contains_audio: true,
            contains_data: true,
            is_cd_extra: true,
            ..Default::default()
        },
        Rule::Interactive => MediaFlags {
            contains_data: true,
            is_cd_interactive: true,
            ..Default::default()
        },
        Rule::Data => MediaFlags {
            contains_data: true,
            ..Default::default()
        },
    };

    Classification {
        flags,
        rule,
        matched,
    }
}

const NO_DISC_TOKENS: &[&str] = &[
    "no medium found",
    "no disc",
    "error in getting information about disc",
];

fn track_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(\d+):\s+\d+:\d+:\d+\s+\d+\s+(\S+)").expect("valid track regex")
    })
}

fn session_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)session\s+#(\d+)\s+starts").expect("valid session regex"))
}

fn volume_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^[ \t]*Volume[ \t]*:[ \t]*(.*?)[ \t]*$|label\s+`([^']*)'")
            .expect("valid volume regex")
    })
}

pub fn reports_no_disc(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    NO_DISC_TOKENS.iter().any(|t| lower.contains(t))
}

/// Parses a cd-info style report. Parsing keys off tokens (track rows, analysis
/// markers), never byte offsets, so extra or reordered sections are tolerated.
pub fn parse_cd_info(text: &str) -> Result<DriveReport, JobError> {
    if text.trim().is_empty() || reports_no_disc(text) {
        return Err(JobError::NoDiscPresent);
    }

    let mut report = DriveReport {
        session_count: 1,
        ..Default::default()
    };

    for line in text.lines() {
        if let Some(caps) = track_re().captures(line) {
            let number: u32 = caps[1].parse().unwrap_or(0);
            let kind = match &caps[2] {
                "leadout" => continue,
                "audio" => TrackKind::Audio,
                "data" | "XA" => TrackKind::Data,
                "CD-i" => TrackKind::Interactive,
                other => {
                    return Err(JobError::UnreadableMedia {
                        reason: format!("track {number} has unknown type '{other}'"),
                    });
                }
            };
            report.tracks.push(Track { number, kind });
            continue;
        }
        if let Some(caps) = session_re().captures(line) {
            let n: u32 = caps[1].parse().unwrap_or(1);
            report.session_count = report.session_count.max(n);
        }
        if line.contains("CD-Plus/Extra") {
            report.cd_extra_signature = true;
        }
        if line.contains("CD-RTOS") || line.contains("CD-i disc") {
            report.interactive_marker = true;
        }
    }

    if report.tracks.is_empty() {
        return Err(JobError::UnreadableMedia {
            reason: "report contains no track list".into(),
        });
    }
    if report.tracks.iter().any(|t| t.kind == TrackKind::Interactive) {
        report.interactive_marker = true;
    }

    report.volume_id = volume_re().captures(text).and_then(|caps| {
        caps.get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty())
    });

    Ok(report)
}
