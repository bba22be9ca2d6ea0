use glass_core::ChannelKind;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::process::{Child, ChildStdout, Command};
use tokio::time::timeout;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("failed to spawn {channel} worker: {source}")]
    Spawn {
        channel: ChannelKind,
        #[source]
        source: io::Error,
    },
    #[error("{channel} worker started without a stdout pipe")]
    MissingPipe { channel: ChannelKind },
    #[error("{channel} worker is already running")]
    AlreadyRunning { channel: ChannelKind },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerMode {
    OneShot,
    Streaming,
}

impl WorkerMode {
    pub fn for_channel(channel: ChannelKind) -> Self {
        if channel.is_streaming() {
            WorkerMode::Streaming
        } else {
            WorkerMode::OneShot
        }
    }
}

/// How to start a worker. The channel name is appended as `--channel <kind>`.
#[derive(Debug, Clone)]
pub struct WorkerLauncher {
    program: PathBuf,
    args: Vec<String>,
}

impl WorkerLauncher {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn current_exe(args: Vec<String>) -> io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?, args))
    }

    fn command(&self, channel: ChannelKind) -> Command {
        let mut std_command = std::process::Command::new(&self.program);
        std_command
            .args(&self.args)
            .arg("--channel")
            .arg(channel.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        // Own group, so a kill also reaches the salt commands the worker runs.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            std_command.process_group(0);
        }
        let mut command = Command::from(std_command);
        command.kill_on_drop(true);
        command
    }
}

struct WorkerHandle {
    channel: ChannelKind,
    mode: WorkerMode,
    child: Child,
    pgid: Option<u32>,
    exit: Option<ExitStatus>,
}

impl WorkerHandle {
    fn kill(&mut self) {
        self.kill_group();
        if let Err(err) = self.child.start_kill() {
            debug!(event = "worker_kill_error", channel = %self.channel, error = %err);
        }
    }

    /// SIGKILLs everything left in the worker's process group, leader or not.
    fn kill_group(&self) {
        let Some(pgid) = self.pgid else {
            return;
        };
        if let Err(err) = kill_process_group(pgid) {
            debug!(event = "worker_group_kill_error", channel = %self.channel, pgid, error = %err);
        }
    }

    fn poll_exit(&mut self) -> Option<ExitStatus> {
        if self.exit.is_some() {
            return self.exit;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.exit = Some(status);
                info!(event = "worker_exited", channel = %self.channel, status = %status);
                Some(status)
            }
            Ok(None) => None,
            Err(err) => {
                warn!(event = "worker_wait_error", channel = %self.channel, error = %err);
                None
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub joined: usize,
    pub killed: usize,
    pub abandoned: usize,
}

enum Settled {
    Joined,
    Killed,
    Abandoned,
}

pub struct Supervisor {
    launcher: WorkerLauncher,
    workers: Vec<WorkerHandle>,
}

impl Supervisor {
    pub fn new(launcher: WorkerLauncher) -> Self {
        Self {
            launcher,
            workers: Vec::new(),
        }
    }

    pub fn spawn_one_shot(&mut self, channel: ChannelKind) -> Result<ChildStdout, SupervisorError> {
        self.spawn(channel, WorkerMode::OneShot)
    }

    pub fn spawn_streaming(&mut self, channel: ChannelKind) -> Result<ChildStdout, SupervisorError> {
        self.spawn(channel, WorkerMode::Streaming)
    }

    fn spawn(&mut self, channel: ChannelKind, mode: WorkerMode) -> Result<ChildStdout, SupervisorError> {
        if self
            .workers
            .iter_mut()
            .any(|worker| worker.channel == channel && worker.poll_exit().is_none())
        {
            return Err(SupervisorError::AlreadyRunning { channel });
        }
        let mut child = self
            .launcher
            .command(channel)
            .spawn()
            .map_err(|source| SupervisorError::Spawn { channel, source })?;
        let Some(stdout) = child.stdout.take() else {
            let _ = child.start_kill();
            return Err(SupervisorError::MissingPipe { channel });
        };
        let pgid = child.id();
        info!(event = "worker_spawned", channel = %channel, mode = ?mode, pid = ?pgid);
        self.workers.push(WorkerHandle {
            channel,
            mode,
            child,
            pgid,
            exit: None,
        });
        Ok(stdout)
    }

    /// Collects the exit status of the worker on `channel` if it has ended.
    pub fn reap(&mut self, channel: ChannelKind) -> Option<ExitStatus> {
        self.workers
            .iter_mut()
            .rev()
            .find(|worker| worker.channel == channel)
            .and_then(WorkerHandle::poll_exit)
    }

    /// Workers that ended since the last call.
    pub fn reap_exited(&mut self) -> Vec<(ChannelKind, ExitStatus)> {
        let mut exited = Vec::new();
        for worker in &mut self.workers {
            if worker.exit.is_some() {
                continue;
            }
            if let Some(status) = worker.poll_exit() {
                exited.push((worker.channel, status));
            }
        }
        exited
    }

    pub fn running(&mut self) -> usize {
        self.workers
            .iter_mut()
            .map(WorkerHandle::poll_exit)
            .filter(Option::is_none)
            .count()
    }

    /// One-shot workers get `grace` to finish on their own before they are
    /// killed; streaming workers never finish, so they are killed up front.
    /// Kills go to the worker's whole process group, and every group is swept
    /// once more at the end, so nothing a worker started outlives the call.
    /// Every wait is bounded, so this returns even if a child ignores SIGKILL.
    pub async fn shutdown(&mut self, grace: Duration) -> ShutdownReport {
        let mut report = ShutdownReport::default();
        let mut workers = std::mem::take(&mut self.workers);

        for worker in workers
            .iter_mut()
            .filter(|worker| worker.mode == WorkerMode::Streaming)
        {
            if worker.poll_exit().is_none() {
                worker.kill();
            }
        }

        for worker in &mut workers {
            match settle(worker, grace).await {
                Settled::Joined => report.joined += 1,
                Settled::Killed => report.killed += 1,
                Settled::Abandoned => report.abandoned += 1,
            }
            worker.kill_group();
        }

        info!(
            event = "supervisor_shutdown",
            joined = report.joined,
            killed = report.killed,
            abandoned = report.abandoned
        );
        report
    }
}

async fn settle(worker: &mut WorkerHandle, grace: Duration) -> Settled {
    if worker.exit.is_some() {
        return Settled::Joined;
    }
    if worker.mode == WorkerMode::OneShot {
        match timeout(grace, worker.child.wait()).await {
            Ok(Ok(status)) => {
                worker.exit = Some(status);
                return Settled::Joined;
            }
            Ok(Err(err)) => {
                warn!(event = "worker_wait_error", channel = %worker.channel, error = %err);
            }
            Err(_) => {
                warn!(event = "worker_join_timeout", channel = %worker.channel, grace_ms = grace.as_millis() as u64);
            }
        }
        worker.kill();
    }
    match timeout(grace, worker.child.wait()).await {
        Ok(Ok(status)) => {
            worker.exit = Some(status);
            debug!(event = "worker_killed", channel = %worker.channel, status = %status);
            Settled::Killed
        }
        Ok(Err(err)) => {
            warn!(event = "worker_abandoned", channel = %worker.channel, error = %err);
            Settled::Abandoned
        }
        Err(_) => {
            warn!(event = "worker_abandoned", channel = %worker.channel, reason = "kill_timeout");
            Settled::Abandoned
        }
    }
}

#[cfg(unix)]
fn kill_process_group(pgid: u32) -> io::Result<()> {
    let pgid = libc::pid_t::try_from(pgid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "process group id out of range"))?;
    let result = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if result == -1 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            return Err(err);
        }
    }
    Ok(())
}

#[cfg(not(unix))]
fn kill_process_group(_pgid: u32) -> io::Result<()> {
    Ok(())
}
