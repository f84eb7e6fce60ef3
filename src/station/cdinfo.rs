use super::{DiscProbe, process_failure};
use crate::{
    classify::{DriveReport, parse_cd_info, reports_no_disc},
    config::Config,
    error::JobError,
    process::{ToolCall, expand_args},
};
use std::time::Duration;
use tracing::debug;

/// Runs libcdio's `cd-info` (or anything printing the same report) against the drive.
pub struct CdInfoProbe {
    exe: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CdInfoProbe {
    pub fn new(cfg: &Config) -> Self {
        Self {
            exe: cfg.tools.cd_info.exe.clone(),
            args: cfg.tools.cd_info.args.clone(),
            timeout: cfg.timeout(),
        }
    }
}

impl DiscProbe for CdInfoProbe {
    fn classify(&self, drive: &str) -> Result<DriveReport, JobError> {
        let args = expand_args(&self.args, &[("drive", drive)]);
        let out = ToolCall::new(&self.exe, args)
            .run(self.timeout)
            .map_err(|err| {
                process_failure("disc inspection", err, |reason| JobError::UnreadableMedia {
                    reason,
                })
            })?;
        debug!("cd-info exit={:?} stdout_bytes={}", out.code, out.stdout.len());

        // The "no medium" diagnostics land on stderr, the report itself on stdout.
        if reports_no_disc(&out.combined()) {
            return Err(JobError::NoDiscPresent);
        }
        if !out.success() {
            return Err(JobError::UnreadableMedia {
                reason: format!("disc inspection exited with {:?}: {}", out.code, out.combined()),
            });
        }
        parse_cd_info(&out.stdout)
    }
}
