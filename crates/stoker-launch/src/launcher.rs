use std::{
    env, io,
    path::{Path, PathBuf},
    process::Stdio,
};

use async_trait::async_trait;
use stoker_core::ChannelId;
use thiserror::Error;
use tokio::process::Command;

/// Worker binary name used when no override or sibling is found.
const DEFAULT_WORKER_BIN: &str = "stokerd";

/// Errors emitted while starting a worker process.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Spawning the worker binary failed.
    #[error("failed to spawn worker: {0}")]
    Spawn(#[from] io::Error),
}

/// Capability for starting a worker process bound to a channel.
#[async_trait]
pub trait WorkerLauncher: Send + Sync {
    /// Starts a worker for `channel`. Returns once the process was
    /// spawned; never waits for the worker to become ready.
    async fn launch(&self, working_dir: &Path, channel: &ChannelId) -> Result<(), LaunchError>;
}

/// Spawns the `stokerd` binary as a detached background process.
pub struct ProcessLauncher {
    worker_bin: PathBuf,
    scratch_dir: PathBuf,
    debug: bool,
}

impl ProcessLauncher {
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            worker_bin: default_worker_bin(),
            scratch_dir: scratch_dir.into(),
            debug: false,
        }
    }

    /// Overrides the worker binary path.
    pub fn with_worker_bin(mut self, worker_bin: impl Into<PathBuf>) -> Self {
        self.worker_bin = worker_bin.into();
        self
    }

    /// Forwards the debug flag to launched workers.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

#[async_trait]
impl WorkerLauncher for ProcessLauncher {
    async fn launch(&self, working_dir: &Path, channel: &ChannelId) -> Result<(), LaunchError> {
        let mut command = Command::new(&self.worker_bin);
        command
            .arg("--channel")
            .arg(channel.as_str())
            .arg("--scratch-dir")
            .arg(&self.scratch_dir)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if self.debug {
            command.arg("--debug");
        }

        let child = command.spawn()?;
        tracing::debug!(
            worker = %self.worker_bin.display(),
            pid = child.id(),
            "worker process started"
        );
        // The worker owns its own lifetime; no handle is retained.
        drop(child);
        Ok(())
    }
}

/// Resolves the worker binary: env override first, then a sibling of
/// the current executable, then a PATH lookup.
fn default_worker_bin() -> PathBuf {
    if let Some(bin) = env::var_os("STOKERD_BIN") {
        return PathBuf::from(bin);
    }

    if let Ok(exe) = env::current_exe()
        && let Some(dir) = exe.parent()
    {
        let sibling = dir.join(DEFAULT_WORKER_BIN);
        if sibling.exists() {
            return sibling;
        }
    }

    PathBuf::from(DEFAULT_WORKER_BIN)
}
