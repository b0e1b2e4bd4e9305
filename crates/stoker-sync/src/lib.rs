//! Named cross-process mutual exclusion used by the launch protocol.
//!
//! The orchestration core only ever talks to the [`LockSpace`] trait;
//! [`MemoryLockSpace`] makes the launch decision provable in-process
//! while [`FsLockSpace`] backs it with `flock(2)` lock files.

mod memory;
#[cfg(unix)]
mod unix;

pub use memory::MemoryLockSpace;
#[cfg(unix)]
pub use unix::FsLockSpace;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Exclusive ownership of a named lock; released when dropped.
pub trait Lease: Send {
    /// Releases as if the holder had terminated without unlocking.
    ///
    /// Backends where the kernel reclaims ownership on process death
    /// behave exactly like a plain drop.
    fn abandon(self: Box<Self>) {}
}

/// Result of one bounded acquisition attempt.
pub enum Acquire {
    /// The lock is now held by the caller.
    Acquired {
        /// Ownership handle; dropping it releases the lock.
        lease: Box<dyn Lease>,
        /// True when the previous holder terminated without releasing.
        /// By policy that is a successful acquisition, not an error.
        abandoned: bool,
    },
    /// The wait budget elapsed before the lock became free.
    TimedOut,
    /// The caller's cancellation signal fired during the wait.
    Cancelled,
}

/// Errors emitted by lock-space backends.
#[derive(Debug, Error)]
pub enum LockError {
    /// Underlying I/O failure while touching the backing primitive.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Internal lock-space state is no longer usable.
    #[error("lock space state poisoned")]
    Poisoned,
}

/// Capability interface over named cross-process exclusion primitives.
#[async_trait]
pub trait LockSpace: Send + Sync {
    /// Attempts to take exclusive ownership of `name`, waiting up to
    /// `wait` and unwinding early when `cancel` fires. At least one
    /// attempt is made even with a zero budget.
    async fn acquire(
        &self,
        name: &str,
        wait: Duration,
        cancel: &CancellationToken,
    ) -> Result<Acquire, LockError>;

    /// Reports whether some live process currently holds `name`.
    ///
    /// Probing never creates the primitive and never leaves a handle
    /// held, so a probe can never itself look like a holder.
    fn probe(&self, name: &str) -> bool;
}
