pub mod audio;
pub mod cdinfo;
pub mod imaging;
pub mod robot;

use crate::{
    classify::DriveReport,
    config::{AudioFormat, Config},
    error::JobError,
    job::CarrierJob,
    process::ProcessError,
};
use std::path::{Path, PathBuf};

pub use audio::AudioRipper;
pub use cdinfo::CdInfoProbe;
pub use imaging::IsoImager;
pub use robot::DriverRobot;

/// Disc-loading hardware. One blocking call per action, no retries.
pub trait Robot: Send {
    fn load(&self) -> Result<(), JobError>;
    fn eject(&self) -> Result<(), JobError>;
    fn reject(&self) -> Result<(), JobError>;
}

/// Inspects the medium in a drive without changing hardware state.
pub trait DiscProbe: Send {
    fn classify(&self, drive: &str) -> Result<DriveReport, JobError>;
}

pub trait Imager: Send {
    fn image(&self, job: &CarrierJob, out_dir: &Path) -> Result<ImageOutput, JobError>;
}

pub trait Ripper: Send {
    fn rip(
        &self,
        job: &CarrierJob,
        format: AudioFormat,
        out_dir: &Path,
    ) -> Result<RipOutput, JobError>;
}

#[derive(Debug, Clone)]
pub struct ImageOutput {
    pub iso_path: PathBuf,
    pub bytes: u64,
}

#[derive(Debug, Clone)]
pub struct RipOutput {
    pub tracks: Vec<PathBuf>,
    pub format: AudioFormat,
}

/// Deterministic ISO name for a job.
pub fn iso_file_name(job: &CarrierJob) -> String {
    format!("{}_{:03}.iso", job.job_id, job.volume_no)
}

/// The set of collaborators one orchestrator drives.
pub struct Station {
    pub robot: Box<dyn Robot>,
    pub probe: Box<dyn DiscProbe>,
    pub imager: Box<dyn Imager>,
    pub ripper: Box<dyn Ripper>,
}

impl Station {
    /// Tool-backed station. Expects a validated config.
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            robot: Box::new(DriverRobot::new(cfg)),
            probe: Box::new(CdInfoProbe::new(cfg)),
            imager: Box::new(IsoImager::new(cfg)),
            ripper: Box::new(AudioRipper::new(cfg)),
        }
    }
}

/// Timeouts become `HardwareTimeout`; any other process failure is mapped by `other`.
pub(crate) fn process_failure(
    action: &str,
    err: ProcessError,
    other: impl FnOnce(String) -> JobError,
) -> JobError {
    match err {
        ProcessError::Timeout { timeout, .. } => JobError::HardwareTimeout {
            action: action.to_string(),
            timeout_secs: timeout.as_secs(),
        },
        err => other(err.to_string()),
    }
}
