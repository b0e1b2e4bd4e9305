use std::{
    io::{self, Write},
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
    time::Duration,
};

use clap::Parser;
use stoker_core::{ChannelId, Outcome, Rejection, WorkRequest, default_scratch_dir};
use stoker_ipc::{UnixConnector, execute};
use stoker_launch::{ChannelConfig, Coordinator, ProcessLauncher};
use stoker_sync::FsLockSpace;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Parser)]
#[command(name = "stoker", about = "Run work through a warm stoker worker")]
struct Cli {
    /// Channel identity; defaults to one derived from the working directory.
    #[arg(long)]
    channel: Option<String>,
    /// Directory the work runs in.
    #[arg(long)]
    working_dir: Option<PathBuf>,
    /// Directory holding the channel socket and lock files.
    #[arg(long)]
    scratch_dir: Option<PathBuf>,
    /// Wait budget in seconds when a server must first be launched.
    #[arg(long, default_value_t = 10)]
    new_server_wait_secs: u64,
    /// Wait budget in seconds when a server is already running.
    #[arg(long, default_value_t = 2)]
    live_server_wait_secs: u64,
    /// Ask the server to stay warm at least this long afterwards.
    #[arg(long)]
    keep_alive_secs: Option<u64>,
    /// Verbose logging to stderr.
    #[arg(long)]
    debug: bool,
    /// Work argument vector.
    #[arg(last = true, required = true, num_args = 1..)]
    argv: Vec<String>,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("cannot determine a working directory: {0}")]
    WorkingDir(io::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::from(1)
        }
    }
}

async fn run() -> Result<ExitCode, CliError> {
    let cli = Cli::parse();

    if cli.debug {
        tracing_subscriber::fmt()
            .with_target(false)
            .with_writer(io::stderr)
            .with_max_level(tracing::Level::DEBUG)
            .init();
    }

    let working_dir = match cli.working_dir {
        Some(dir) => dir,
        None => std::env::current_dir().map_err(CliError::WorkingDir)?,
    };
    let scratch_dir = cli.scratch_dir.or_else(default_scratch_dir);
    let channel = ChannelId(
        cli.channel
            .unwrap_or_else(|| format!("stoker:{}", working_dir.display())),
    );

    // One cancellation signal covers every wait, from the exclusion
    // queue through the exchange.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let config = ChannelConfig {
        channel,
        working_dir: working_dir.clone(),
        scratch_dir: scratch_dir.clone(),
        new_server_wait: Duration::from_secs(cli.new_server_wait_secs),
        live_server_wait: Duration::from_secs(cli.live_server_wait_secs),
    };
    let request = WorkRequest {
        working_dir: working_dir.display().to_string(),
        scratch_dir: scratch_dir
            .as_deref()
            .map(|dir| dir.display().to_string())
            .unwrap_or_default(),
        arguments: cli.argv.clone(),
        keep_alive_secs: cli.keep_alive_secs,
    };

    match run_via_server(scratch_dir, config, request, cli.debug, &cancel).await {
        Outcome::Completed(output) => {
            // Replay the server-captured streams as our own.
            io::stdout().write_all(output.stdout.as_bytes())?;
            io::stderr().write_all(output.stderr.as_bytes())?;
            Ok(to_exit_code(output.exit_code))
        }
        Outcome::Rejected(reason) => {
            tracing::debug!(%reason, "server unavailable, running locally");
            run_local(&cli.argv, &working_dir).await
        }
    }
}

/// Obtains a server connection and performs the one exchange.
async fn run_via_server(
    scratch_dir: Option<PathBuf>,
    config: ChannelConfig,
    request: WorkRequest,
    debug: bool,
    cancel: &CancellationToken,
) -> Outcome {
    let Some(scratch) = scratch_dir else {
        return Outcome::Rejected(Rejection::ScratchDirUnavailable);
    };

    let coordinator = Coordinator::new(
        Arc::new(FsLockSpace::new(&scratch)),
        Arc::new(ProcessLauncher::new(&scratch).with_debug(debug)),
        Arc::new(UnixConnector),
    );

    let connection = match coordinator.obtain_connection(&config, cancel).await {
        Ok(connection) => connection,
        Err(reason) => return Outcome::Rejected(reason),
    };

    execute(connection, &request, cancel).await
}

/// The uniform fallback: run the argv here with inherited stdio.
async fn run_local(argv: &[String], working_dir: &Path) -> Result<ExitCode, CliError> {
    let Some((program, args)) = argv.split_first() else {
        return Ok(ExitCode::from(2));
    };

    let status = tokio::process::Command::new(program)
        .args(args)
        .current_dir(working_dir)
        .status()
        .await?;

    Ok(to_exit_code(status.code().unwrap_or(1)))
}

fn to_exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}
