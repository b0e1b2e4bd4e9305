use std::{
    fs::{File, OpenOptions},
    io,
    os::fd::AsRawFd,
    path::PathBuf,
    time::Duration,
};

use async_trait::async_trait;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;

use crate::{Acquire, Lease, LockError, LockSpace};

/// Interval between contended acquisition retries.
const RETRY_INTERVAL: Duration = Duration::from_millis(25);

/// Lock files under a shared directory, owned via `flock(2)`.
///
/// The kernel releases `flock` ownership when the holding process
/// dies, so a crashed holder never wedges a lock: acquisition after a
/// crash simply succeeds and is indistinguishable from a clean
/// handoff (`abandoned` is always false here).
pub struct FsLockSpace {
    root: PathBuf,
}

impl FsLockSpace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn lock_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.lock"))
    }
}

#[async_trait]
impl LockSpace for FsLockSpace {
    async fn acquire(
        &self,
        name: &str,
        wait: Duration,
        cancel: &CancellationToken,
    ) -> Result<Acquire, LockError> {
        let path = self.lock_path(name);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;
        let deadline = Instant::now() + wait;

        loop {
            if try_flock(&file, libc::LOCK_EX | libc::LOCK_NB)? {
                return Ok(Acquire::Acquired {
                    lease: Box::new(FsLease { _file: file }),
                    abandoned: false,
                });
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(Acquire::TimedOut);
            }

            tokio::select! {
                _ = cancel.cancelled() => return Ok(Acquire::Cancelled),
                _ = sleep(remaining.min(RETRY_INTERVAL)) => {}
            }
        }
    }

    fn probe(&self, name: &str) -> bool {
        // Open without create: a name nobody ever locked must stay absent.
        let file = match OpenOptions::new().read(true).open(self.lock_path(name)) {
            Ok(file) => file,
            Err(err) => {
                if err.kind() != io::ErrorKind::NotFound {
                    tracing::debug!(name, error = %err, "lock probe failed to open");
                }
                return false;
            }
        };

        // A shared attempt conflicts only with an exclusive holder; the
        // probe's own lock dies with `file` at the end of this scope.
        match try_flock(&file, libc::LOCK_SH | libc::LOCK_NB) {
            Ok(granted) => !granted,
            Err(err) => {
                tracing::debug!(name, error = %err, "lock probe failed");
                false
            }
        }
    }
}

/// Closing the descriptor releases the flock.
struct FsLease {
    _file: File,
}

impl Lease for FsLease {}

fn try_flock(file: &File, operation: libc::c_int) -> io::Result<bool> {
    // SAFETY: the fd is owned by `file` and stays open for the call.
    let rc = unsafe { libc::flock(file.as_raw_fd(), operation) };
    if rc == 0 {
        return Ok(true);
    }

    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
        Ok(false)
    } else {
        Err(err)
    }
}
