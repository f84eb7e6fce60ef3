use crate::{error::ErrorKind, util::now_rfc3339};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use unicode_normalization::UnicodeNormalization;
use uuid::Uuid;

/// How the operator identified the carrier. Exactly one identifier per job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CarrierRef {
    Ppn(String),
    Title(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmissionError {
    #[error("volume number must be greater than or equal to 1")]
    InvalidVolume,
    #[error("carrier identifier is empty")]
    EmptyIdentifier,
}

/// Lifecycle of one carrier. Variant order follows the happy path, so `>=` comparisons
/// on non-terminal states read as "has got at least this far".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum JobState {
    Idle,
    Loading,
    Classifying,
    Processing,
    Verifying,
    Recording,
    Ejecting,
    Done,
    Failed,
    Rejected,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Rejected)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaFlags {
    pub contains_audio: bool,
    pub contains_data: bool,
    pub is_cd_extra: bool,
    pub is_mixed_mode: bool,
    pub is_cd_interactive: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarrierJob {
    pub job_id: String,
    pub carrier: CarrierRef,
    pub volume_no: u32,
    pub status: JobState,
    pub media: MediaFlags,
    /// Set once the medium has been classified; `media` is meaningless before that.
    pub classified: bool,
    /// ISO 9660 volume identifier, when the disc has one.
    pub volume_id: Option<String>,
    /// `None` until the job is terminal.
    pub success: Option<bool>,
    pub created_at: String,
    pub completed_at: Option<String>,
}

impl CarrierJob {
    pub fn new(carrier: CarrierRef, volume_no: u32) -> Result<Self, SubmissionError> {
        if volume_no < 1 {
            return Err(SubmissionError::InvalidVolume);
        }
        let carrier = match carrier {
            CarrierRef::Ppn(p) => CarrierRef::Ppn(p.trim().to_string()),
            CarrierRef::Title(t) => CarrierRef::Title(t.trim().nfc().collect()),
        };
        let ident = match &carrier {
            CarrierRef::Ppn(s) | CarrierRef::Title(s) => s,
        };
        if ident.is_empty() {
            return Err(SubmissionError::EmptyIdentifier);
        }
        Ok(Self {
            job_id: Uuid::new_v4().to_string(),
            carrier,
            volume_no,
            status: JobState::Idle,
            media: MediaFlags::default(),
            classified: false,
            volume_id: None,
            success: None,
            created_at: now_rfc3339(),
            completed_at: None,
        })
    }

    pub fn ppn(&self) -> &str {
        match &self.carrier {
            CarrierRef::Ppn(p) => p,
            CarrierRef::Title(_) => "",
        }
    }

    pub fn title(&self) -> &str {
        match &self.carrier {
            CarrierRef::Title(t) => t,
            CarrierRef::Ppn(_) => "",
        }
    }

    /// Human label for logs and operator prompts.
    pub fn label(&self) -> String {
        match &self.carrier {
            CarrierRef::Ppn(p) => format!("PPN {p}, volume {}", self.volume_no),
            CarrierRef::Title(t) => format!("'{t}', volume {}", self.volume_no),
        }
    }

    pub(crate) fn finish(&mut self, state: JobState) {
        self.status = state;
        self.success = Some(state == JobState::Done);
        self.completed_at = Some(now_rfc3339());
    }
}

/// Completion signal handed back to the submitter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    pub job: CarrierJob,
    pub reason: String,
    pub error: Option<ErrorKind>,
    #[serde(default)]
    pub warnings: Vec<String>,
}
