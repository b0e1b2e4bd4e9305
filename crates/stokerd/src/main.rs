mod runner;

use std::{
    fs, io,
    os::unix::fs::FileTypeExt,
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
    time::Duration,
};

use clap::Parser;
use stoker_core::{ChannelId, default_scratch_dir, derive_sync_names, endpoint_name};
use stoker_ipc::serve_channel;
use stoker_sync::{Acquire, FsLockSpace, LockSpace};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::runner::{IdleTracker, WorkRunner};

#[derive(Debug, Parser)]
#[command(name = "stokerd", about = "Stoker worker daemon")]
struct Args {
    /// Channel identity this worker serves.
    #[arg(long)]
    channel: String,
    /// Directory holding the channel socket and lock files.
    #[arg(long)]
    scratch_dir: Option<PathBuf>,
    /// Idle window in seconds before the daemon shuts itself down.
    #[arg(long, default_value_t = 600)]
    idle_secs: u64,
    /// Verbose logging.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("stokerd error: {err}");
            ExitCode::from(1)
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(if args.debug {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();

    let channel = ChannelId(args.channel);
    if channel.as_str().is_empty() {
        return Err("channel identity must not be empty".into());
    }
    let Some(scratch_dir) = args.scratch_dir.or_else(default_scratch_dir) else {
        return Err("no scratch directory available".into());
    };

    let names = derive_sync_names(&channel);
    let endpoint = scratch_dir.join(endpoint_name(&channel));

    // The server lock is the presence marker clients probe; holding it
    // for the process lifetime is what "a server is running" means.
    let locks = FsLockSpace::new(&scratch_dir);
    let acquired = locks
        .acquire(&names.server_lock, Duration::ZERO, &CancellationToken::new())
        .await?;
    let _presence = match acquired {
        Acquire::Acquired { lease, .. } => lease,
        Acquire::TimedOut => {
            // Lost the launch race; the winner serves this channel.
            info!(channel = channel.as_str(), "server already running, exiting");
            return Ok(());
        }
        Acquire::Cancelled => return Ok(()),
    };

    prepare_endpoint(&endpoint)?;

    let shutdown = CancellationToken::new();
    let idle = Arc::new(IdleTracker::new(Duration::from_secs(args.idle_secs)));
    let runner = Arc::new(WorkRunner::new(Arc::clone(&idle)));

    info!(
        channel = channel.as_str(),
        endpoint = %endpoint.display(),
        idle_secs = args.idle_secs,
        daemon = env!("CARGO_PKG_VERSION"),
        "starting stokerd"
    );

    let watchdog = tokio::spawn(idle_watchdog(Arc::clone(&idle), shutdown.clone()));

    let served = serve_channel(&endpoint, runner, shutdown.clone()).await;
    shutdown.cancel();
    let _ = watchdog.await;
    let _ = fs::remove_file(&endpoint);

    served?;
    info!("stokerd stopped");
    Ok(())
}

/// Cancels the serve loop once the idle deadline passes.
async fn idle_watchdog(idle: Arc<IdleTracker>, shutdown: CancellationToken) {
    loop {
        let deadline = idle.deadline();
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tokio::time::sleep_until(deadline) => {
                // Requests may have pushed the deadline out in the meantime.
                if idle.expired() {
                    tracing::debug!("idle window elapsed, shutting down");
                    shutdown.cancel();
                    return;
                }
            }
        }
    }
}

fn prepare_endpoint(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(metadata) => {
            if metadata.file_type().is_socket() {
                // Stale leftover; the held server lock proves no live owner.
                fs::remove_file(path)
            } else {
                Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("{} exists and is not a socket", path.display()),
                ))
            }
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}
