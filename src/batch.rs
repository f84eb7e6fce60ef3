use crate::{
    manifest::{MANIFEST_FILE, ManifestWriter},
    util::ensure_dir,
};
use anyhow::{Context, Result, anyhow};
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

pub const VERSION_FILE: &str = "version.txt";
pub const LOG_FILE: &str = "batch.log";

/// One operator working set: a directory holding the manifest, version marker, batch
/// log and one sub-directory per job.
#[derive(Debug, Clone)]
pub struct Batch {
    dir: PathBuf,
}

impl Batch {
    /// Creates `<root>/<prefix>-<uuid>` with its version marker and manifest header.
    pub fn create(root: &Path, prefix: &str) -> Result<Self> {
        let dir = root.join(format!("{}-{}", prefix, Uuid::new_v4()));
        ensure_dir(&dir)?;
        std::fs::write(
            dir.join(VERSION_FILE),
            format!("{}\n", env!("CARGO_PKG_VERSION")),
        )
        .with_context(|| format!("writing version marker in {}", dir.display()))?;
        let batch = Self { dir };
        batch.open_manifest()?;
        info!("created batch {}", batch.name());
        Ok(batch)
    }

    /// Reopens an existing batch so more carriers can be added to it.
    pub fn open(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(anyhow!("batch directory does not exist: {}", dir.display()));
        }
        let batch = Self {
            dir: dir.to_path_buf(),
        };
        if !batch.dir.join(VERSION_FILE).exists() {
            std::fs::write(
                batch.dir.join(VERSION_FILE),
                format!("{}\n", env!("CARGO_PKG_VERSION")),
            )?;
        }
        info!("opened batch {}", batch.name());
        Ok(batch)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Batch identity is the directory name.
    pub fn name(&self) -> String {
        self.dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(MANIFEST_FILE)
    }

    pub fn log_path(&self) -> PathBuf {
        self.dir.join(LOG_FILE)
    }

    pub fn job_dir(&self, job_id: &str) -> PathBuf {
        self.dir.join(job_id)
    }

    pub fn open_manifest(&self) -> Result<ManifestWriter> {
        Ok(ManifestWriter::open(&self.manifest_path())?)
    }
}
