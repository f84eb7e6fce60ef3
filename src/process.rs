//! Blocking external-tool invocation bounded by a timeout.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("spawning {}: {source}", exe.display())]
    Spawn {
        exe: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} exceeded timeout ({:?})", exe.display(), timeout)]
    Timeout {
        exe: PathBuf,
        timeout: Duration,
        output: ToolOutput,
    },

    #[error("waiting for {}: {source}", exe.display())]
    Io {
        exe: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    /// `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// stdout followed by stderr, for diagnostics.
    pub fn combined(&self) -> String {
        match (self.stdout.trim().is_empty(), self.stderr.trim().is_empty()) {
            (true, true) => String::new(),
            (false, true) => self.stdout.trim_end().to_string(),
            (true, false) => self.stderr.trim_end().to_string(),
            (false, false) => format!("{}\n{}", self.stdout.trim_end(), self.stderr.trim_end()),
        }
    }
}

/// One fully expanded tool call.
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub exe: PathBuf,
    pub args: Vec<String>,
    pub current_dir: Option<PathBuf>,
}

impl ToolCall {
    pub fn new(exe: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            exe: exe.into(),
            args,
            current_dir: None,
        }
    }

    pub fn in_dir(mut self, dir: &Path) -> Self {
        self.current_dir = Some(dir.to_path_buf());
        self
    }

    /// Runs the tool to completion. A nonzero exit is NOT an error here; callers decide
    /// what the exit code means.
    pub fn run(&self, timeout: Duration) -> Result<ToolOutput, ProcessError> {
        debug!(
            "exec {} {:?} timeout={:?}",
            self.exe.display(),
            self.args,
            timeout
        );
        let mut cmd = Command::new(&self.exe);
        cmd.args(&self.args);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }
        // Own process group, so a timeout can take down the tool's children as well.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
            exe: self.exe.clone(),
            source,
        })?;

        wait_with_timeout(&mut child, timeout).map_err(|err| match err {
            WaitError::Io(source) => ProcessError::Io {
                exe: self.exe.clone(),
                source,
            },
            WaitError::TimedOut(output) => ProcessError::Timeout {
                exe: self.exe.clone(),
                timeout,
                output,
            },
        })
    }
}

/// Replaces `{name}` placeholders in an argument template.
pub fn expand_args(template: &[String], vars: &[(&str, &str)]) -> Vec<String> {
    template
        .iter()
        .map(|arg| {
            let mut out = arg.clone();
            for (k, v) in vars {
                out = out.replace(&format!("{{{k}}}"), v);
            }
            out
        })
        .collect()
}

enum WaitError {
    Io(std::io::Error),
    TimedOut(ToolOutput),
}

/// How long pipe readers get after the process ends before their output is taken as-is.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Result<ToolOutput, WaitError> {
    // Drain pipes while waiting so a chatty tool can't block on a full pipe buffer.
    let stdout = Drain::spawn(child.stdout.take());
    let stderr = Drain::spawn(child.stderr.take());

    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait().map_err(WaitError::Io)? {
            // A background grandchild may still hold the pipes open.
            let deadline = (start + timeout).max(Instant::now() + DRAIN_GRACE);
            return Ok(ToolOutput {
                code: status.code(),
                stdout: stdout.finish_by(deadline),
                stderr: stderr.finish_by(deadline),
            });
        }

        if start.elapsed() > timeout {
            warn!("process timed out after {:?}; killing it", timeout);
            kill_tree(child);
            let status = child.wait().map_err(WaitError::Io)?;
            let deadline = Instant::now() + DRAIN_GRACE;
            return Err(WaitError::TimedOut(ToolOutput {
                code: status.code(),
                stdout: stdout.finish_by(deadline),
                stderr: stderr.finish_by(deadline),
            }));
        }

        std::thread::sleep(Duration::from_millis(50));
    }
}

/// Kills the tool together with anything it spawned into its process group.
#[cfg(unix)]
fn kill_tree(child: &mut Child) {
    if let Ok(pgid) = libc::pid_t::try_from(child.id()) {
        // SAFETY: plain syscall; the group was created for this child at spawn time.
        unsafe {
            libc::killpg(pgid, libc::SIGKILL);
        }
    }
    let _ = child.kill();
}

#[cfg(not(unix))]
fn kill_tree(child: &mut Child) {
    let _ = child.kill();
}

/// Background reader collecting one pipe into a shared buffer.
struct Drain {
    buf: Arc<Mutex<Vec<u8>>>,
    handle: JoinHandle<()>,
}

impl Drain {
    fn spawn<R: Read + Send + 'static>(reader: Option<R>) -> Self {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buf);
        let handle = std::thread::spawn(move || {
            let Some(mut r) = reader else { return };
            let mut chunk = [0u8; 8192];
            loop {
                match r.read(&mut chunk) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => lock(&sink).extend_from_slice(&chunk[..n]),
                }
            }
        });
        Self { buf, handle }
    }

    /// Waits for EOF until `deadline`, then returns whatever was read. A reader still
    /// blocked past the deadline is left detached.
    fn finish_by(self, deadline: Instant) -> String {
        while !self.handle.is_finished() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        if self.handle.is_finished() {
            let _ = self.handle.join();
        } else {
            debug!("pipe still open after the process ended; output may be truncated");
        }
        String::from_utf8_lossy(&lock(&self.buf)).into_owned()
    }
}

fn lock(buf: &Mutex<Vec<u8>>) -> std::sync::MutexGuard<'_, Vec<u8>> {
    buf.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
