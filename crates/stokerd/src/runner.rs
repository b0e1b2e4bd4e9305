use std::{process::Stdio, sync::Arc, sync::Mutex, time::Duration};

use async_trait::async_trait;
use stoker_core::{WorkReply, WorkRequest};
use stoker_ipc::WorkHandler;
use tokio::{process::Command, time::Instant};

/// Tracks when the daemon has been idle long enough to shut down.
pub struct IdleTracker {
    window: Duration,
    deadline: Mutex<Instant>,
}

impl IdleTracker {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: Mutex::new(Instant::now() + window),
        }
    }

    /// Pushes the shutdown deadline out past now. A keep-alive hint can
    /// widen the window for this touch but never narrow what an earlier
    /// hint already granted.
    pub fn touch(&self, keep_alive: Option<Duration>) {
        let window = keep_alive.map_or(self.window, |hint| hint.max(self.window));
        let next = Instant::now() + window;
        let mut deadline = self.slot();
        if next > *deadline {
            *deadline = next;
        }
    }

    pub fn deadline(&self) -> Instant {
        *self.slot()
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.deadline()
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Instant> {
        self.deadline
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Executes requested work and reports captured output.
pub struct WorkRunner {
    idle: Arc<IdleTracker>,
}

impl WorkRunner {
    pub fn new(idle: Arc<IdleTracker>) -> Self {
        Self { idle }
    }
}

#[async_trait]
impl WorkHandler for WorkRunner {
    async fn handle(&self, request: WorkRequest) -> WorkReply {
        let keep_alive = request.keep_alive_secs.map(Duration::from_secs);
        self.idle.touch(keep_alive);

        let reply = run_work(&request).await;

        self.idle.touch(keep_alive);
        reply
    }
}

async fn run_work(request: &WorkRequest) -> WorkReply {
    let Some((program, args)) = request.arguments.split_first() else {
        return WorkReply::Declined {
            reason: "empty argument vector".to_string(),
        };
    };

    tracing::debug!(program = %program, "running work");

    let mut command = Command::new(program);
    command
        .args(args)
        .current_dir(&request.working_dir)
        .env("TMPDIR", &request.scratch_dir)
        .stdin(Stdio::null());

    match command.output().await {
        Ok(output) => WorkReply::Done {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        },
        // Failing to even start the work mirrors the shell convention
        // for "command not found"; the client replays it either way.
        Err(err) => WorkReply::Done {
            exit_code: 127,
            stdout: String::new(),
            stderr: format!("{program}: {err}\n"),
        },
    }
}
