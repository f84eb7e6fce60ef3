//! Batch manifest: one header row, then one row per completed job, append-only.

use crate::{error::RunError, job::CarrierJob};
use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const MANIFEST_FILE: &str = "manifest.csv";

pub const HEADER: [&str; 11] = [
    "jobID",
    "PPN",
    "volumeNo",
    "title",
    "volumeID",
    "success",
    "containsAudio",
    "containsData",
    "cdExtra",
    "mixedMode",
    "cdInteractive",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestRecord {
    pub job_id: String,
    pub ppn: String,
    pub volume_no: u32,
    pub title: String,
    pub volume_id: String,
    pub success: bool,
    pub contains_audio: bool,
    pub contains_data: bool,
    pub cd_extra: bool,
    pub mixed_mode: bool,
    pub cd_interactive: bool,
}

impl ManifestRecord {
    /// Row for `job` with the given outcome.
    pub fn from_job(job: &CarrierJob, success: bool) -> Self {
        Self {
            job_id: job.job_id.clone(),
            ppn: job.ppn().to_string(),
            volume_no: job.volume_no,
            title: job.title().to_string(),
            volume_id: job.volume_id.clone().unwrap_or_default(),
            success,
            contains_audio: job.media.contains_audio,
            contains_data: job.media.contains_data,
            cd_extra: job.media.is_cd_extra,
            mixed_mode: job.media.is_mixed_mode,
            cd_interactive: job.media.is_cd_interactive,
        }
    }

    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.job_id.clone(),
            self.ppn.clone(),
            self.volume_no.to_string(),
            self.title.clone(),
            self.volume_id.clone(),
            flag(self.success).into(),
            flag(self.contains_audio).into(),
            flag(self.contains_data).into(),
            flag(self.cd_extra).into(),
            flag(self.mixed_mode).into(),
            flag(self.cd_interactive).into(),
        ]
    }

    fn from_row(row: &[String]) -> Result<Self> {
        if row.len() != HEADER.len() {
            bail!("expected {} columns, got {}", HEADER.len(), row.len());
        }
        Ok(Self {
            job_id: row[0].clone(),
            ppn: row[1].clone(),
            volume_no: row[2]
                .parse()
                .with_context(|| format!("volumeNo: {}", row[2]))?,
            title: row[3].clone(),
            volume_id: row[4].clone(),
            success: parse_flag(&row[5])?,
            contains_audio: parse_flag(&row[6])?,
            contains_data: parse_flag(&row[7])?,
            cd_extra: parse_flag(&row[8])?,
            mixed_mode: parse_flag(&row[9])?,
            cd_interactive: parse_flag(&row[10])?,
        })
    }
}

/// Exclusive appender for one batch's manifest. The file is reopened in append mode for
/// every row, so each record is a complete open/write/sync/close cycle.
pub struct ManifestWriter {
    path: PathBuf,
}

impl ManifestWriter {
    /// Opens the manifest for appending, writing the header first if the file is new
    /// or empty.
    pub fn open(path: &Path) -> Result<Self, RunError> {
        let writer = Self {
            path: path.to_path_buf(),
        };
        let mut file = writer.open_append()?;
        let len = file.metadata().map_err(|e| writer.write_err(e))?.len();
        if len == 0 {
            let header: Vec<String> = HEADER.iter().map(|h| h.to_string()).collect();
            file.write_all(encode_row(&header).as_bytes())
                .and_then(|_| file.sync_data())
                .map_err(|e| writer.write_err(e))?;
        }
        Ok(writer)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Durability point for a job: the row is flushed and synced before returning.
    pub fn append(&mut self, job: &CarrierJob, success: bool) -> Result<(), RunError> {
        let line = encode_row(&ManifestRecord::from_job(job, success).to_row());
        debug!("manifest append job={} success={success}", job.job_id);
        let mut file = self.open_append()?;
        file.write_all(line.as_bytes())
            .and_then(|_| file.flush())
            .and_then(|_| file.sync_data())
            .map_err(|e| self.write_err(e))
    }

    fn open_append(&self) -> Result<File, RunError> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.write_err(e))
    }

    fn write_err(&self, source: std::io::Error) -> RunError {
        RunError::ManifestWriteFailed {
            path: self.path.clone(),
            source,
        }
    }
}

/// Reads every record back, checking the header.
pub fn read_manifest(path: &Path) -> Result<Vec<ManifestRecord>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading manifest: {}", path.display()))?;
    let mut rows = parse_rows(&raw)?.into_iter();
    let header = rows.next().ok_or_else(|| anyhow!("manifest is empty"))?;
    if header != HEADER {
        bail!("unexpected manifest header: {:?}", header);
    }
    rows.enumerate()
        .map(|(i, row)| ManifestRecord::from_row(&row).with_context(|| format!("row {}", i + 2)))
        .collect()
}

fn flag(b: bool) -> &'static str {
    if b { "True" } else { "False" }
}

fn parse_flag(s: &str) -> Result<bool> {
    match s.to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => bail!("not a boolean: {other}"),
    }
}

fn encode_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn encode_row(row: &[String]) -> String {
    let mut line = row
        .iter()
        .map(|f| encode_field(f))
        .collect::<Vec<_>>()
        .join(",");
    line.push('\n');
    line
}

/// Minimal RFC 4180 reader: quoted fields may hold commas, quotes and newlines.
fn parse_rows(raw: &str) -> Result<Vec<Vec<String>>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' if field.is_empty() => in_quotes = true,
            ',' => row.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => {
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
            }
            _ => field.push(c),
        }
    }
    if in_quotes {
        bail!("unterminated quoted field");
    }
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }
    Ok(rows)
}
