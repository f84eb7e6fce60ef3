use crate::error::RunError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub station: Station,
    #[serde(default)]
    pub paths: Paths,
    #[serde(default)]
    pub batch: Batch,
    #[serde(default)]
    pub audio: Audio,
    #[serde(default)]
    pub submission: Submission,
    #[serde(default)]
    pub tools: Tools,
    #[serde(default)]
    pub logging: Logging,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        Ok(cfg)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.station.timeout_seconds)
    }

    /// Startup checks. Everything is checked once here; components trust the values
    /// afterwards.
    pub fn validate(&self) -> Result<(), RunError> {
        if self.station.timeout_seconds == 0 {
            return Err(RunError::InvalidConfig(
                "station.timeout_seconds must be greater than zero".into(),
            ));
        }
        if self.station.drive.trim().is_empty() {
            return Err(RunError::InvalidConfig("station.drive is empty".into()));
        }
        for (name, dir) in [
            ("paths.root_dir", &self.paths.root_dir),
            ("paths.temp_dir", &self.paths.temp_dir),
        ] {
            if !Path::new(dir).is_dir() {
                return Err(RunError::InvalidConfig(format!(
                    "{name} does not exist: {dir}"
                )));
            }
        }
        for (name, exe) in self.tools.named() {
            if resolve_exe(exe).is_none() {
                return Err(RunError::InvalidConfig(format!(
                    "tools.{name}.exe not found: {exe}"
                )));
            }
        }
        if !Path::new(&self.station.drive).exists() {
            return Err(RunError::DriveNotFound {
                drive: self.station.drive.clone(),
            });
        }
        Ok(())
    }
}

/// Resolves a tool either as an existing path or through `PATH`.
pub fn resolve_exe(exe: &str) -> Option<PathBuf> {
    let p = Path::new(exe);
    if p.components().count() > 1 || p.is_absolute() {
        return p.is_file().then(|| p.to_path_buf());
    }
    which::which(exe).ok()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Station {
    pub drive: String,
    pub timeout_seconds: u64,
}
impl Default for Station {
    fn default() -> Self {
        Self {
            drive: "/dev/sr0".into(),
            timeout_seconds: 900,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paths {
    pub root_dir: String,
    pub temp_dir: String,
}
impl Default for Paths {
    fn default() -> Self {
        Self {
            root_dir: "batches".into(),
            temp_dir: ".ripstation-tmp".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub prefix: String,
}
impl Default for Batch {
    fn default() -> Self {
        Self {
            prefix: "rs".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Wav,
    Flac,
}

impl AudioFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Wav => "wav",
            Self::Flac => "flac",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Audio {
    pub format: AudioFormat,
}
impl Default for Audio {
    fn default() -> Self {
        Self {
            format: AudioFormat::Flac,
        }
    }
}

/// Which metadata field identifies a carrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionMode {
    Title,
    Ppn,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub mode: SubmissionMode,
}
impl Default for Submission {
    fn default() -> Self {
        Self {
            mode: SubmissionMode::Title,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    pub exe: String,
    pub args: Vec<String>,
}

impl Tool {
    fn new(exe: &str, args: &[&str]) -> Self {
        Self {
            exe: exe.into(),
            args: args.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Robot {
    pub exe: String,
    pub load_args: Vec<String>,
    pub eject_args: Vec<String>,
    pub reject_args: Vec<String>,
}
impl Default for Robot {
    fn default() -> Self {
        let v = |xs: &[&str]| -> Vec<String> { xs.iter().map(|s| s.to_string()).collect() };
        Self {
            exe: "nimbie".into(),
            load_args: v(&["--drive={drive}", "--load"]),
            eject_args: v(&["--drive={drive}", "--unload"]),
            reject_args: v(&["--drive={drive}", "--reject"]),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Tools {
    pub robot: Robot,
    pub cd_info: Tool,
    pub imager: Tool,
    pub ripper: Tool,
    pub encoder: Tool,
    pub verifier: Tool,
}
impl Default for Tools {
    fn default() -> Self {
        Self {
            robot: Robot::default(),
            cd_info: Tool::new("cd-info", &["--no-cddb", "--no-device-info", "-C", "{drive}"]),
            imager: Tool::new(
                "ddrescue",
                &["-b", "2048", "-r", "3", "{drive}", "{output}", "{log}"],
            ),
            ripper: Tool::new("cdparanoia", &["-d", "{drive}", "-B", "--", "1-"]),
            encoder: Tool::new(
                "flac",
                &["--best", "--verify", "--silent", "-o", "{output}", "{input}"],
            ),
            verifier: Tool::new("flac", &["--test", "--silent", "{input}"]),
        }
    }
}

impl Tools {
    fn named(&self) -> [(&'static str, &str); 6] {
        [
            ("robot", self.robot.exe.as_str()),
            ("cd_info", self.cd_info.exe.as_str()),
            ("imager", self.imager.exe.as_str()),
            ("ripper", self.ripper.exe.as_str()),
            ("encoder", self.encoder.exe.as_str()),
            ("verifier", self.verifier.exe.as_str()),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: true,
        }
    }
}
