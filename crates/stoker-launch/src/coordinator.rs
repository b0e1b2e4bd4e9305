use std::{path::PathBuf, sync::Arc, time::Duration};

use stoker_core::{ChannelId, Rejection, derive_sync_names, endpoint_name};
use stoker_ipc::{Connector, ServerConnection, connect_channel};
use stoker_sync::{Acquire, LockSpace};
use tokio_util::sync::CancellationToken;

use crate::launcher::WorkerLauncher;

/// Per-call configuration for obtaining a server connection.
#[derive(Clone)]
pub struct ChannelConfig {
    /// Logical channel identity; every derived name comes from it.
    pub channel: ChannelId,
    /// Directory the work runs in; forwarded to launched workers.
    pub working_dir: PathBuf,
    /// Directory holding the channel socket and lock files. `None`
    /// means no scratch directory could be resolved.
    pub scratch_dir: Option<PathBuf>,
    /// Wait budget when a server must first be launched.
    pub new_server_wait: Duration,
    /// Wait budget when a live server is expected to answer fast.
    pub live_server_wait: Duration,
}

/// Orchestrates the launch-or-reuse decision and the bounded connect.
pub struct Coordinator {
    locks: Arc<dyn LockSpace>,
    launcher: Arc<dyn WorkerLauncher>,
    connector: Arc<dyn Connector>,
}

impl Coordinator {
    pub fn new(
        locks: Arc<dyn LockSpace>,
        launcher: Arc<dyn WorkerLauncher>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            locks,
            launcher,
            connector,
        }
    }

    /// Obtains a connected channel for `config.channel`, launching a
    /// worker when none is running.
    ///
    /// Either hands back a usable connection or cleanly says no: every
    /// failure mode resolves to a [`Rejection`], and the caller's
    /// fallback is always to perform the work locally. Cancellation
    /// unwinds every pending wait promptly without leaving a lock held
    /// or a connection open.
    pub async fn obtain_connection(
        &self,
        config: &ChannelConfig,
        cancel: &CancellationToken,
    ) -> Result<ServerConnection, Rejection> {
        if config.channel.as_str().is_empty() {
            return Err(Rejection::EmptyChannel);
        }
        let Some(scratch_dir) = config.scratch_dir.as_deref() else {
            return Err(Rejection::ScratchDirUnavailable);
        };

        let names = derive_sync_names(&config.channel);
        let endpoint = scratch_dir.join(endpoint_name(&config.channel));

        // The client lock serializes the launch decision across
        // concurrently starting client processes; without it, N clients
        // could each observe "no server" and each spawn one.
        let acquired = self
            .locks
            .acquire(&names.client_lock, config.new_server_wait, cancel)
            .await
            .map_err(|err| {
                tracing::debug!(error = %err, "client exclusion backend failed");
                Rejection::ExclusionUnavailable
            })?;
        let lease = match acquired {
            Acquire::Acquired { lease, abandoned } => {
                if abandoned {
                    // A previous holder died mid-decision. Exclusion among
                    // live holders is intact, so the grant stands.
                    tracing::debug!(
                        lock = %names.client_lock,
                        "recovered an abandoned client exclusion"
                    );
                }
                lease
            }
            Acquire::TimedOut => return Err(Rejection::ExclusionTimeout),
            Acquire::Cancelled => return Err(Rejection::Cancelled),
        };

        let was_running = self.locks.probe(&names.server_lock);
        let connect_wait = if was_running {
            config.live_server_wait
        } else {
            config.new_server_wait
        };

        if !was_running {
            if let Err(err) = self
                .launcher
                .launch(&config.working_dir, &config.channel)
                .await
            {
                tracing::debug!(error = %err, "worker launch failed");
                drop(lease);
                return Err(Rejection::LaunchFailed);
            }
            tracing::debug!(channel = config.channel.as_str(), "worker launched");
        }

        // The exclusion only protects the launch decision, not the
        // handshake: release it before connecting so other clients can
        // observe the now-running server and proceed with their own.
        drop(lease);

        match connect_channel(self.connector.as_ref(), &endpoint, connect_wait, cancel).await {
            Some(connection) => Ok(connection),
            None if cancel.is_cancelled() => Err(Rejection::Cancelled),
            None => Err(Rejection::ConnectTimeout),
        }
    }
}
