use crate::{
    batch::Batch,
    classify::classify,
    config::{Config, SubmissionMode, resolve_exe},
    interrupt,
    job::{CarrierJob, CarrierRef, JobReport, JobState},
    orchestrator::{Orchestrator, Worker},
    station::{CdInfoProbe, DiscProbe, Station},
    util::ensure_dir,
};
use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "ripstation")]
#[command(about = "Unattended optical disc robot orchestrator (load + classify + image/rip + manifest)")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./ripstation.toml if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check configuration, tools and drive without touching the robot.
    Doctor {},
    /// Inspect the disc currently in the drive and print its classification.
    Classify {},
    /// Create a new batch directory under paths.root_dir.
    NewBatch {},
    /// Process carriers listed in a TOML file, one at a time.
    Run {
        /// Existing batch directory. A new batch is created when omitted.
        #[arg(long)]
        batch: Option<PathBuf>,
        #[arg(long)]
        carriers: PathBuf,
    },
}

pub fn dispatch(args: Args) -> Result<()> {
    let cfg_path = resolve_config_path(args.config.as_deref())?;
    let cfg = Config::load(&cfg_path)?;

    match &args.cmd {
        Command::Doctor {} => {
            let _guard = init_logging(&args, &cfg, None)?;
            doctor(&cfg)
        }
        Command::Classify {} => {
            let _guard = init_logging(&args, &cfg, None)?;
            classify_disc(&cfg)
        }
        Command::NewBatch {} => {
            let _guard = init_logging(&args, &cfg, None)?;
            new_batch(&cfg)
        }
        Command::Run { batch, carriers } => run(&args, &cfg, batch.as_deref(), carriers),
    }
}

fn resolve_config_path(user: Option<&Path>) -> Result<PathBuf> {
    if let Some(p) = user {
        return Ok(p.to_path_buf());
    }
    let default = PathBuf::from("ripstation.toml");
    if default.exists() {
        Ok(default)
    } else {
        Ok(PathBuf::from("ripstation.example.toml"))
    }
}

fn init_logging(
    args: &Args,
    cfg: &Config,
    file_path: Option<&Path>,
) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stdout_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let (file_layer, guard) = match file_path.filter(|_| cfg.logging.write_to_file) {
        Some(path) => {
            let parent = path.parent().unwrap_or_else(|| Path::new("."));
            ensure_dir(parent)?;
            // Append: a reopened batch keeps its earlier history.
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("open log file: {}", path.display()))?;
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

fn doctor(cfg: &Config) -> Result<()> {
    let tools = &cfg.tools;
    let mut found = serde_json::Map::new();
    for (name, exe) in [
        ("robot", &tools.robot.exe),
        ("cd_info", &tools.cd_info.exe),
        ("imager", &tools.imager.exe),
        ("ripper", &tools.ripper.exe),
        ("encoder", &tools.encoder.exe),
        ("verifier", &tools.verifier.exe),
    ] {
        found.insert(
            name.to_string(),
            serde_json::json!({
                "exe": exe,
                "resolved": resolve_exe(exe),
            }),
        );
    }
    let validation = cfg.validate();
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "drive": cfg.station.drive,
            "drive_present": Path::new(&cfg.station.drive).exists(),
            "tools": found,
            "ok": validation.is_ok(),
            "error": validation.as_ref().err().map(|e| e.to_string()),
        }))?
    );
    Ok(validation?)
}

fn classify_disc(cfg: &Config) -> Result<()> {
    cfg.validate()?;
    let probe = CdInfoProbe::new(cfg);
    let report = probe
        .classify(&cfg.station.drive)
        .with_context(|| format!("inspecting {}", cfg.station.drive))?;
    let verdict = classify(&report);
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "drive": cfg.station.drive,
            "report": report,
            "classification": verdict,
        }))?
    );
    Ok(())
}

fn new_batch(cfg: &Config) -> Result<()> {
    let batch = Batch::create(Path::new(&cfg.paths.root_dir), &cfg.batch.prefix)?;
    println!("{}", batch.dir().display());
    Ok(())
}

#[derive(Debug, Deserialize)]
struct CarrierList {
    #[serde(default)]
    carrier: Vec<CarrierEntry>,
}

#[derive(Debug, Deserialize)]
struct CarrierEntry {
    ppn: Option<String>,
    title: Option<String>,
    volume_no: u32,
}

fn load_carriers(cfg: &Config, path: &Path) -> Result<Vec<CarrierJob>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading carriers: {}", path.display()))?;
    let list: CarrierList = toml::from_str(&raw).with_context(|| "parsing carriers TOML")?;
    list.carrier
        .into_iter()
        .enumerate()
        .map(|(i, entry)| {
            let carrier = match (cfg.submission.mode, entry.ppn, entry.title) {
                (SubmissionMode::Ppn, Some(ppn), None) => CarrierRef::Ppn(ppn),
                (SubmissionMode::Title, None, Some(title)) => CarrierRef::Title(title),
                (mode, _, _) => {
                    return Err(anyhow!(
                        "carrier {}: submission mode {:?} needs exactly its own identifier",
                        i + 1,
                        mode
                    ));
                }
            };
            CarrierJob::new(carrier, entry.volume_no).with_context(|| format!("carrier {}", i + 1))
        })
        .collect()
}

fn run(args: &Args, cfg: &Config, batch_dir: Option<&Path>, carriers: &Path) -> Result<()> {
    cfg.validate()?;
    let jobs = load_carriers(cfg, carriers)?;

    let batch = match batch_dir {
        Some(dir) => Batch::open(dir)?,
        None => Batch::create(Path::new(&cfg.paths.root_dir), &cfg.batch.prefix)?,
    };
    let _guard = init_logging(args, cfg, Some(&batch.log_path()))?;
    info!("batch={} carriers={}", batch.name(), jobs.len());

    let orchestrator = Orchestrator::new(cfg, Station::from_config(cfg), batch.clone())?;
    let worker = orchestrator.spawn();
    interrupt::install();

    let total = jobs.len();
    let mut reports = Vec::with_capacity(total);
    for job in jobs {
        if interrupt::requested() {
            break;
        }
        info!("load disc {} into the disc loader", job.label());
        worker.submit(job)?;
        match wait_for_completion(&worker) {
            Some(report) => {
                println!("{}", serde_json::to_string(&report)?);
                reports.push(report);
            }
            None => break,
        }
    }

    worker.request_quit();
    worker.join()?;
    let skipped = total - reports.len();
    if skipped > 0 {
        warn!("stopped early; {skipped} carriers were not submitted");
    }

    let count = |state: JobState| reports.iter().filter(|r| r.job.status == state).count();
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "batch": batch.name(),
            "batch_dir": batch.dir(),
            "manifest": batch.manifest_path(),
            "done": count(JobState::Done),
            "failed": count(JobState::Failed),
            "rejected": count(JobState::Rejected),
            "skipped": skipped,
        }))?
    );
    Ok(())
}

/// Blocks until the worker reports the job, or returns `None` if the worker stopped.
/// An operator interrupt is passed on as a quit request; the disc in flight finishes.
fn wait_for_completion(worker: &Worker) -> Option<JobReport> {
    let mut quit_sent = false;
    loop {
        if interrupt::requested() && !quit_sent {
            quit_sent = true;
            worker.request_quit();
            if worker.is_processing() {
                info!("quit requested; finishing the current disc first");
            }
        }
        if let Some(report) = worker.wait_completed(Duration::from_millis(500)) {
            if !report.warnings.is_empty() {
                warn!("job={} warnings: {:?}", report.job.job_id, report.warnings);
            }
            return Some(report);
        }
        if worker.is_finished() {
            return worker.try_completed();
        }
    }
}
