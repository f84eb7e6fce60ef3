use super::{ImageOutput, Imager, iso_file_name, process_failure};
use crate::{
    config::Config,
    error::JobError,
    job::CarrierJob,
    process::{ToolCall, expand_args},
};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Reads the whole data session into one ISO file.
pub struct IsoImager {
    exe: String,
    args: Vec<String>,
    drive: String,
    timeout: Duration,
}

impl IsoImager {
    pub fn new(cfg: &Config) -> Self {
        Self {
            exe: cfg.tools.imager.exe.clone(),
            args: cfg.tools.imager.args.clone(),
            drive: cfg.station.drive.clone(),
            timeout: cfg.timeout(),
        }
    }
}

impl Imager for IsoImager {
    fn image(&self, job: &CarrierJob, out_dir: &Path) -> Result<ImageOutput, JobError> {
        let iso_path = out_dir.join(iso_file_name(job));
        let log_path = out_dir.join("imager.log");
        let iso = iso_path.display().to_string();
        let log = log_path.display().to_string();
        let out_dir_s = out_dir.display().to_string();
        let args = expand_args(
            &self.args,
            &[
                ("drive", &self.drive),
                ("output", &iso),
                ("output_dir", &out_dir_s),
                ("log", &log),
            ],
        );

        info!("imaging job={} -> {}", job.job_id, iso_path.display());
        let out = ToolCall::new(&self.exe, args)
            .in_dir(out_dir)
            .run(self.timeout)
            .map_err(|err| {
                discard_partial(&iso_path);
                process_failure("imaging", err, |reason| JobError::ImagingFailed {
                    reason,
                    output: String::new(),
                })
            })?;

        if !out.success() {
            discard_partial(&iso_path);
            return Err(JobError::ImagingFailed {
                reason: format!("imaging tool exited with {:?}", out.code),
                output: out.combined(),
            });
        }

        let bytes = std::fs::metadata(&iso_path).map(|m| m.len()).unwrap_or(0);
        if bytes == 0 {
            discard_partial(&iso_path);
            return Err(JobError::ImagingFailed {
                reason: format!("no image produced at {}", iso_path.display()),
                output: out.combined(),
            });
        }

        Ok(ImageOutput { iso_path, bytes })
    }
}

/// A failed run may leave a truncated image behind; it must not look like output.
fn discard_partial(iso_path: &Path) {
    if iso_path.exists() {
        if let Err(err) = std::fs::remove_file(iso_path) {
            warn!("could not remove partial image {}: {err}", iso_path.display());
        }
    }
}
