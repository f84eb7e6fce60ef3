use super::{RipOutput, Ripper, process_failure};
use crate::{
    config::{AudioFormat, Config, Tool},
    error::JobError,
    job::CarrierJob,
    process::{ToolCall, ToolOutput, expand_args},
    util::{ensure_dir, list_files, move_file},
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Rips audio tracks into a staging directory, then either moves the WAVs into the job
/// directory or encodes + verifies them as FLAC.
pub struct AudioRipper {
    ripper: Tool,
    encoder: Tool,
    verifier: Tool,
    drive: String,
    temp_dir: PathBuf,
    timeout: Duration,
}

impl AudioRipper {
    pub fn new(cfg: &Config) -> Self {
        Self {
            ripper: cfg.tools.ripper.clone(),
            encoder: cfg.tools.encoder.clone(),
            verifier: cfg.tools.verifier.clone(),
            drive: cfg.station.drive.clone(),
            temp_dir: PathBuf::from(&cfg.paths.temp_dir),
            timeout: cfg.timeout(),
        }
    }

    fn extract(&self, stage: &Path) -> Result<Vec<PathBuf>, JobError> {
        let stage_s = stage.display().to_string();
        let args = expand_args(
            &self.ripper.args,
            &[("drive", &self.drive), ("output_dir", &stage_s)],
        );
        let out = ToolCall::new(&self.ripper.exe, args)
            .in_dir(stage)
            .run(self.timeout)
            .map_err(|err| {
                process_failure("audio rip", err, |reason| JobError::RipFailed {
                    reason,
                    output: String::new(),
                })
            })?;
        if !out.success() {
            return Err(JobError::RipFailed {
                reason: format!("ripping tool exited with {:?}", out.code),
                output: out.combined(),
            });
        }

        let wavs = staged_wavs(stage).map_err(|err| JobError::RipFailed {
            reason: format!("{err:#}"),
            output: out.combined(),
        })?;
        if wavs.is_empty() {
            return Err(JobError::RipFailed {
                reason: format!("no tracks extracted into {}", stage.display()),
                output: out.combined(),
            });
        }
        info!("ripped {} tracks into {}", wavs.len(), stage.display());
        Ok(wavs)
    }

    fn encode(&self, wav: &Path, flac: &Path) -> Result<(), JobError> {
        let input = wav.display().to_string();
        let output = flac.display().to_string();
        let args = expand_args(&self.encoder.args, &[("input", &input), ("output", &output)]);
        let out = self
            .run_aux("transcode", &self.encoder.exe, args, |reason| {
                JobError::TranscodeFailed {
                    reason,
                    output: String::new(),
                }
            })
            .inspect_err(|_| {
                let _ = std::fs::remove_file(flac);
            })?;
        if !out.success() {
            let _ = std::fs::remove_file(flac);
            return Err(JobError::TranscodeFailed {
                reason: format!("encoder exited with {:?} for {}", out.code, wav.display()),
                output: out.combined(),
            });
        }
        if !flac.is_file() {
            return Err(JobError::TranscodeFailed {
                reason: format!("encoder produced no file at {}", flac.display()),
                output: out.combined(),
            });
        }
        Ok(())
    }

    fn verify(&self, wav: &Path, flac: &Path) -> Result<(), JobError> {
        let input = flac.display().to_string();
        let source = wav.display().to_string();
        let args = expand_args(&self.verifier.args, &[("input", &input), ("source", &source)]);
        let out = self.run_aux("verification", &self.verifier.exe, args, |reason| {
            JobError::VerificationFailed { reason }
        })?;
        if !out.success() {
            let _ = std::fs::remove_file(flac);
            return Err(JobError::VerificationFailed {
                reason: format!(
                    "{} failed integrity check ({:?}): {}",
                    flac.display(),
                    out.code,
                    out.combined()
                ),
            });
        }
        Ok(())
    }

    fn run_aux(
        &self,
        action: &str,
        exe: &str,
        args: Vec<String>,
        other: impl FnOnce(String) -> JobError,
    ) -> Result<ToolOutput, JobError> {
        ToolCall::new(exe, args)
            .run(self.timeout)
            .map_err(|err| process_failure(action, err, other))
    }
}

impl Ripper for AudioRipper {
    fn rip(
        &self,
        job: &CarrierJob,
        format: AudioFormat,
        out_dir: &Path,
    ) -> Result<RipOutput, JobError> {
        let stage = self.temp_dir.join(&job.job_id);
        ensure_dir(&stage).map_err(|err| JobError::RipFailed {
            reason: format!("{err:#}"),
            output: String::new(),
        })?;

        let wavs = self.extract(&stage)?;
        let mut tracks = Vec::with_capacity(wavs.len());

        match format {
            AudioFormat::Wav => {
                for wav in &wavs {
                    let dest = out_dir.join(file_name(wav));
                    move_file(wav, &dest).map_err(|err| JobError::RipFailed {
                        reason: format!("moving {} into place: {err}", wav.display()),
                        output: String::new(),
                    })?;
                    tracks.push(dest);
                }
            }
            AudioFormat::Flac => {
                for wav in &wavs {
                    let flac = out_dir.join(file_name(wav)).with_extension("flac");
                    debug!("encode {} -> {}", wav.display(), flac.display());
                    self.encode(wav, &flac)?;
                    self.verify(wav, &flac)?;
                    tracks.push(flac);
                }
                // Only now are the staged WAVs redundant.
                for wav in &wavs {
                    if let Err(err) = std::fs::remove_file(wav) {
                        warn!("could not remove staged {}: {err}", wav.display());
                    }
                }
            }
        }

        let _ = std::fs::remove_dir(&stage);
        Ok(RipOutput { tracks, format })
    }
}

fn staged_wavs(stage: &Path) -> anyhow::Result<Vec<PathBuf>> {
    Ok(list_files(stage)?
        .into_iter()
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("wav"))
        })
        .collect())
}

fn file_name(path: &Path) -> PathBuf {
    path.file_name().map(PathBuf::from).unwrap_or_default()
}
