use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::{
    sync::{OwnedSemaphorePermit, Semaphore},
    time::timeout,
};
use tokio_util::sync::CancellationToken;

use crate::{Acquire, Lease, LockError, LockSpace};

/// In-process lock space used by tests and single-process setups.
///
/// Each name maps to a single-permit semaphore slot. Abandonment is
/// modelled explicitly so the coordinator's crash-recovery policy can
/// be exercised without an OS primitive.
#[derive(Default)]
pub struct MemoryLockSpace {
    slots: Mutex<HashMap<String, Arc<Slot>>>,
}

struct Slot {
    permits: Arc<Semaphore>,
    abandoned: AtomicBool,
}

impl MemoryLockSpace {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, name: &str) -> Result<Arc<Slot>, LockError> {
        let mut slots = self.slots.lock().map_err(|_| LockError::Poisoned)?;
        Ok(Arc::clone(slots.entry(name.to_string()).or_insert_with(
            || {
                Arc::new(Slot {
                    permits: Arc::new(Semaphore::new(1)),
                    abandoned: AtomicBool::new(false),
                })
            },
        )))
    }
}

#[async_trait]
impl LockSpace for MemoryLockSpace {
    async fn acquire(
        &self,
        name: &str,
        wait: Duration,
        cancel: &CancellationToken,
    ) -> Result<Acquire, LockError> {
        let slot = self.slot(name)?;

        let permit = tokio::select! {
            _ = cancel.cancelled() => return Ok(Acquire::Cancelled),
            attempt = timeout(wait, Arc::clone(&slot.permits).acquire_owned()) => match attempt {
                Ok(Ok(permit)) => permit,
                Ok(Err(_)) => return Err(LockError::Poisoned),
                Err(_) => return Ok(Acquire::TimedOut),
            },
        };

        let abandoned = slot.abandoned.swap(false, Ordering::SeqCst);
        Ok(Acquire::Acquired {
            lease: Box::new(MemoryLease {
                permit: Some(permit),
                slot,
            }),
            abandoned,
        })
    }

    fn probe(&self, name: &str) -> bool {
        let slots = match self.slots.lock() {
            Ok(slots) => slots,
            Err(_) => return false,
        };
        slots
            .get(name)
            .is_some_and(|slot| slot.permits.available_permits() == 0)
    }
}

struct MemoryLease {
    permit: Option<OwnedSemaphorePermit>,
    slot: Arc<Slot>,
}

impl Lease for MemoryLease {
    fn abandon(mut self: Box<Self>) {
        if let Some(permit) = self.permit.take() {
            // The slot stays at zero permits only for the instant between
            // forgetting the old ownership and re-opening it flagged.
            permit.forget();
            self.slot.abandoned.store(true, Ordering::SeqCst);
            self.slot.permits.add_permits(1);
        }
    }
}
