use crate::{
    batch::Batch,
    classify::{DriveReport, classify},
    config::Config,
    error::{JobError, RunError},
    job::{CarrierJob, JobReport, JobState},
    machine::{Effect, Event, transition},
    manifest::ManifestWriter,
    station::{ImageOutput, RipOutput, Station},
    util::{ensure_dir, write_checksums},
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Drives one carrier at a time through the state machine. Owns the station hardware
/// and the batch manifest for as long as it lives.
pub struct Orchestrator {
    cfg: Config,
    station: Station,
    batch: Batch,
    manifest: ManifestWriter,
    quit: Arc<AtomicBool>,
}

/// Scratch state for the job in flight.
struct JobRun {
    job: CarrierJob,
    job_dir: PathBuf,
    report: Option<DriveReport>,
    image: Option<ImageOutput>,
    rip: Option<RipOutput>,
    error: Option<JobError>,
    warnings: Vec<String>,
}

impl Orchestrator {
    pub fn new(cfg: &Config, station: Station, batch: Batch) -> Result<Self, RunError> {
        let manifest = ManifestWriter::open(&batch.manifest_path())?;
        info!("recording to {}", manifest.path().display());
        Ok(Self {
            cfg: cfg.clone(),
            station,
            batch,
            manifest,
            quit: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn batch(&self) -> &Batch {
        &self.batch
    }

    /// Cooperative quit flag, checked only between jobs.
    pub fn quit_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.quit)
    }

    /// Runs one job to a terminal state. Only a manifest failure (or a state machine
    /// bug) escapes as an error; everything else ends up in the returned report.
    pub fn process(&mut self, job: CarrierJob) -> Result<JobReport, RunError> {
        let job_dir = self.batch.job_dir(&job.job_id);
        let mut run = JobRun {
            job,
            job_dir,
            report: None,
            image: None,
            rip: None,
            error: None,
            warnings: Vec::new(),
        };
        info!("job={} submitted: {}", run.job.job_id, run.job.label());

        let first = if self.quit.load(Ordering::SeqCst) {
            run.error = Some(JobError::Cancelled);
            Event::QuitRequested
        } else {
            Event::Submitted
        };

        let mut step = transition(JobState::Idle, first)?;
        loop {
            debug!(
                "job={} {:?} -> {:?}",
                run.job.job_id, run.job.status, step.next
            );
            run.job.status = step.next;

            if step.next.is_terminal() {
                run.job.finish(step.next);
                for effect in &step.effects {
                    self.close(*effect, &mut run)?;
                }
                break;
            }

            let event = match step.effects.first() {
                Some(effect) => self.execute(*effect, &mut run)?,
                None => Event::Succeeded,
            };
            step = transition(run.job.status, event)?;
        }

        Ok(finish_report(run))
    }

    fn execute(&mut self, effect: Effect, run: &mut JobRun) -> Result<Event, RunError> {
        let result = match effect {
            Effect::Load => self.station.robot.load(),
            Effect::Classify => self.classify(run),
            Effect::Process => self.run_pipelines(run),
            Effect::Verify => verify(run),
            // Reached only from Verifying, so the recorded outcome is a success.
            Effect::Record => {
                self.manifest.append(&run.job, true)?;
                Ok(())
            }
            Effect::Eject => match self.station.robot.eject() {
                Ok(()) => Ok(()),
                Err(err) => {
                    warn!("job={} eject failed: {err}", run.job.job_id);
                    run.warnings.push(format!("eject failed: {err}"));
                    return Ok(Event::Failed {
                        unrecoverable: false,
                    });
                }
            },
            Effect::Reject => self.station.robot.reject(),
        };

        match result {
            Ok(()) => Ok(Event::Succeeded),
            Err(err) => {
                warn!("job={} {:?} failed: {err}", run.job.job_id, run.job.status);
                if let Some(output) = err.tool_output().filter(|o| !o.is_empty()) {
                    debug!("job={} tool output:\n{output}", run.job.job_id);
                }
                let unrecoverable = err.is_unrecoverable();
                run.error = Some(err);
                Ok(Event::Failed { unrecoverable })
            }
        }
    }

    /// Closing effects of a terminal state. Recording is mandatory; eject and reject
    /// are best-effort.
    fn close(&mut self, effect: Effect, run: &mut JobRun) -> Result<(), RunError> {
        match effect {
            Effect::Record => self
                .manifest
                .append(&run.job, run.job.success.unwrap_or(false)),
            Effect::Eject => {
                if let Err(err) = self.station.robot.eject() {
                    warn!("job={} eject failed: {err}", run.job.job_id);
                    run.warnings.push(format!("eject failed: {err}"));
                }
                Ok(())
            }
            Effect::Reject => {
                if let Err(err) = self.station.robot.reject() {
                    warn!("job={} reject failed: {err}", run.job.job_id);
                    run.warnings.push(format!("reject failed: {err}"));
                }
                Ok(())
            }
            other => {
                debug!("ignoring closing effect {other:?}");
                Ok(())
            }
        }
    }

    fn classify(&self, run: &mut JobRun) -> Result<(), JobError> {
        let report = self.station.probe.classify(&self.cfg.station.drive)?;
        let verdict = classify(&report);
        if verdict.is_ambiguous() {
            warn!(
                "job={} disc matches several classification rules {:?}; using {:?}",
                run.job.job_id, verdict.matched, verdict.rule
            );
        }
        info!(
            "job={} classified as {:?} tracks={} sessions={} volume_id={:?}",
            run.job.job_id,
            verdict.rule,
            report.tracks.len(),
            report.session_count,
            report.volume_id
        );
        run.job.media = verdict.flags;
        run.job.classified = true;
        run.job.volume_id = report.volume_id.clone();
        run.report = Some(report);
        Ok(())
    }

    /// Data first, then audio. Both must succeed for a mixed disc.
    fn run_pipelines(&self, run: &mut JobRun) -> Result<(), JobError> {
        let flags = run.job.media;
        ensure_dir(&run.job_dir).map_err(|err| {
            let reason = format!("{err:#}");
            if flags.contains_data {
                JobError::ImagingFailed {
                    reason,
                    output: String::new(),
                }
            } else {
                JobError::RipFailed {
                    reason,
                    output: String::new(),
                }
            }
        })?;

        if flags.contains_data {
            let image = self.station.imager.image(&run.job, &run.job_dir)?;
            info!(
                "job={} image {} ({} bytes)",
                run.job.job_id,
                image.iso_path.display(),
                image.bytes
            );
            run.image = Some(image);
        }
        if flags.contains_audio {
            let rip = self
                .station
                .ripper
                .rip(&run.job, self.cfg.audio.format, &run.job_dir)?;
            info!(
                "job={} ripped {} tracks as {:?}",
                run.job.job_id,
                rip.tracks.len(),
                rip.format
            );
            run.rip = Some(rip);
        }
        Ok(())
    }

    /// Moves the orchestrator onto its own worker thread.
    pub fn spawn(mut self) -> Worker {
        let (submit_tx, submit_rx) = mpsc::channel::<CarrierJob>();
        let (done_tx, done_rx) = mpsc::channel::<JobReport>();
        let quit = self.quit_flag();
        let busy = Arc::new(AtomicBool::new(false));
        let busy_worker = Arc::clone(&busy);

        let handle = std::thread::spawn(move || -> Result<(), RunError> {
            loop {
                let job = match submit_rx.recv_timeout(Duration::from_millis(100)) {
                    Ok(job) => job,
                    Err(RecvTimeoutError::Timeout) => {
                        if self.quit.load(Ordering::SeqCst) {
                            break;
                        }
                        continue;
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                };

                busy_worker.store(true, Ordering::SeqCst);
                let result = self.process(job);
                busy_worker.store(false, Ordering::SeqCst);
                let report = result.inspect_err(|err| error!("run aborted: {err}"))?;
                info!(
                    "job={} finished {:?}: {}",
                    report.job.job_id, report.job.status, report.reason
                );
                if done_tx.send(report).is_err() {
                    break;
                }
            }

            // Quit: anything still queued is rejected without touching the hardware.
            while let Ok(job) = submit_rx.try_recv() {
                let report = self.process(job)?;
                let _ = done_tx.send(report);
            }
            info!("worker stopped for batch {}", self.batch.name());
            Ok(())
        });

        Worker {
            submit: Some(submit_tx),
            completed: done_rx,
            quit,
            busy,
            handle,
        }
    }
}

fn verify(run: &mut JobRun) -> Result<(), JobError> {
    let flags = run.job.media;
    if flags.contains_data {
        let image = run.image.as_ref().ok_or_else(|| JobError::VerificationFailed {
            reason: "data disc produced no image".into(),
        })?;
        check_nonempty(&image.iso_path)?;
    }
    if flags.contains_audio {
        let rip = run.rip.as_ref().ok_or_else(|| JobError::VerificationFailed {
            reason: "audio disc produced no tracks".into(),
        })?;
        let expected = run.report.as_ref().map(|r| r.audio_tracks()).unwrap_or(0);
        if rip.tracks.is_empty() || (expected > 0 && rip.tracks.len() != expected) {
            return Err(JobError::VerificationFailed {
                reason: format!(
                    "expected {expected} audio tracks, found {}",
                    rip.tracks.len()
                ),
            });
        }
        for track in &rip.tracks {
            check_nonempty(track)?;
        }
    }
    write_checksums(&run.job_dir).map_err(|err| JobError::VerificationFailed {
        reason: format!("writing checksums: {err:#}"),
    })?;
    Ok(())
}

fn check_nonempty(path: &Path) -> Result<(), JobError> {
    match std::fs::metadata(path) {
        Ok(m) if m.len() > 0 => Ok(()),
        Ok(_) => Err(JobError::VerificationFailed {
            reason: format!("{} is empty", path.display()),
        }),
        Err(err) => Err(JobError::VerificationFailed {
            reason: format!("{}: {err}", path.display()),
        }),
    }
}

fn finish_report(run: JobRun) -> JobReport {
    let reason = match (&run.error, run.job.status) {
        (Some(err), _) => err.to_string(),
        (None, JobState::Done) if run.warnings.is_empty() => "processed successfully".into(),
        (None, JobState::Done) => "processed successfully, with warnings".into(),
        (None, state) => format!("ended in {state:?}"),
    };
    JobReport {
        error: run.error.as_ref().map(JobError::kind),
        job: run.job,
        reason,
        warnings: run.warnings,
    }
}

/// Caller-side handle to a running orchestrator thread.
pub struct Worker {
    submit: Option<Sender<CarrierJob>>,
    completed: Receiver<JobReport>,
    quit: Arc<AtomicBool>,
    busy: Arc<AtomicBool>,
    handle: JoinHandle<Result<(), RunError>>,
}

impl Worker {
    /// Hands a job over and returns immediately. The caller is responsible for not
    /// submitting while [`Worker::is_processing`] is true.
    pub fn submit(&self, job: CarrierJob) -> Result<(), RunError> {
        let tx = self.submit.as_ref().ok_or(RunError::WorkerGone)?;
        tx.send(job).map_err(|_| RunError::WorkerGone)
    }

    pub fn is_processing(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// True once the worker thread has exited (quit, or a run-level error).
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn request_quit(&self) {
        self.quit.store(true, Ordering::SeqCst);
    }

    pub fn try_completed(&self) -> Option<JobReport> {
        self.completed.try_recv().ok()
    }

    pub fn wait_completed(&self, timeout: Duration) -> Option<JobReport> {
        self.completed.recv_timeout(timeout).ok()
    }

    /// Stops accepting jobs and waits for the worker to wind down.
    pub fn join(mut self) -> Result<(), RunError> {
        self.submit.take();
        self.handle.join().map_err(|_| RunError::WorkerGone)?
    }
}
