//! Worker process lifecycle supervisor.
//!
//! Owns at most one live worker process: spawns it, relays its output,
//! relaunches it after a fixed delay whenever it exits, and stops it on
//! explicit request or gateway shutdown.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::process::Child;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use mediagate_core::WorkerConfig;

use super::command::WorkerCommand;

/// Whether the gateway owns the worker process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisionMode {
    /// The gateway spawns, restarts and kills the worker.
    Managed,
    /// The worker runs as an independent service; every lifecycle
    /// operation is a no-op.
    External,
}

impl SupervisionMode {
    pub const fn from_flag(externally_managed: bool) -> Self {
        if externally_managed {
            Self::External
        } else {
            Self::Managed
        }
    }
}

/// Result of a [`WorkerSupervisor::launch`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// A new worker process was started.
    Spawned { pid: Option<u32> },
    /// A worker is already live; nothing was started.
    AlreadyRunning { pid: Option<u32> },
    /// The process could not be started; a restart has been scheduled.
    SpawnFailed,
    /// Externally managed mode, or shutdown in progress.
    Skipped,
}

/// Point-in-time view of the supervised worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerStatus {
    pub mode: SupervisionMode,
    pub running: bool,
    pub pid: Option<u32>,
    /// Launch attempts so far, successful or not.
    pub launches: u64,
    pub restart_pending: bool,
    pub uptime_secs: Option<u64>,
}

/// Errors from worker process operations.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("Failed to spawn worker `{program}`: {reason}")]
    SpawnFailed { program: String, reason: String },
}

/// Supervisor for the single worker process.
///
/// Cloning is cheap; all clones drive the same worker.
#[derive(Clone)]
pub struct WorkerSupervisor {
    inner: Arc<Inner>,
}

struct Inner {
    command: WorkerCommand,
    mode: SupervisionMode,
    restart_delay: Duration,
    terminate_timeout: Duration,
    state: Mutex<State>,
    shutdown: CancellationToken,
}

#[derive(Default)]
struct State {
    worker: Option<LiveWorker>,
    pending_restart: Option<PendingRestart>,
    generation: u64,
    restart_seq: u64,
    launches: u64,
}

struct LiveWorker {
    generation: u64,
    pid: Option<u32>,
    started_at: Instant,
    stop_tx: oneshot::Sender<()>,
    monitor: JoinHandle<()>,
}

struct PendingRestart {
    id: u64,
    task: JoinHandle<()>,
}

impl WorkerSupervisor {
    /// Create a supervisor with the default 5s restart delay and 5s
    /// terminate grace period.
    pub fn new(command: WorkerCommand, mode: SupervisionMode) -> Self {
        Self::with_options(
            command,
            mode,
            Duration::from_secs(5),
            Duration::from_secs(5),
        )
    }

    /// Create a supervisor with explicit timings.
    pub fn with_options(
        command: WorkerCommand,
        mode: SupervisionMode,
        restart_delay: Duration,
        terminate_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                command,
                mode,
                restart_delay,
                terminate_timeout,
                state: Mutex::new(State::default()),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn from_config(config: &WorkerConfig) -> Self {
        Self::with_options(
            WorkerCommand::from_config(config),
            SupervisionMode::from_flag(config.externally_managed),
            config.restart_delay(),
            config.terminate_timeout(),
        )
    }

    pub fn mode(&self) -> SupervisionMode {
        self.inner.mode
    }

    pub fn command(&self) -> &WorkerCommand {
        &self.inner.command
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Start the worker unless one is already live.
    ///
    /// Returns as soon as the process is spawned; the worker may not be
    /// accepting connections yet. A pending restart timer is cancelled, so
    /// it cannot produce a second launch later.
    pub fn launch(&self) -> LaunchOutcome {
        self.inner.launch()
    }

    /// Stop the live worker, if any. Returns whether a worker was stopped.
    ///
    /// Sends SIGTERM, waits for the grace period, then force-kills. Never
    /// schedules a restart.
    pub async fn terminate(&self) -> bool {
        if self.inner.mode == SupervisionMode::External {
            debug!("Worker is externally managed; terminate skipped");
            return false;
        }

        let Some(worker) = self.inner.lock_state().worker.take() else {
            debug!("No live worker to terminate");
            return false;
        };

        info!(
            pid = worker.pid,
            generation = worker.generation,
            "Terminating worker"
        );
        // The monitor may have observed a natural exit already; it is
        // finishing on its own in that case.
        let _ = worker.stop_tx.send(());
        if let Err(e) = worker.monitor.await {
            warn!(error = %e, "Worker monitor task failed");
        }
        true
    }

    /// Terminate the live worker and launch a fresh one.
    ///
    /// The work runs on a detached task: dropping this future does not stop
    /// the relaunch.
    pub async fn restart(&self) -> LaunchOutcome {
        match self.request_restart().await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "Worker restart task failed");
                LaunchOutcome::Skipped
            }
        }
    }

    /// Start a restart in the background and return its handle.
    ///
    /// The terminate and the launch always both run, whether or not the
    /// handle is awaited.
    pub fn request_restart(&self) -> JoinHandle<LaunchOutcome> {
        let supervisor = self.clone();
        tokio::spawn(async move {
            supervisor.terminate().await;
            let outcome = supervisor.launch();
            info!(?outcome, "Worker restart finished");
            outcome
        })
    }

    /// Mark shutdown in progress, cancel any pending restart and stop the
    /// worker. Irreversible: later launches are skipped.
    pub async fn shutdown(&self) {
        info!("Worker supervisor shutting down");
        self.inner.shutdown.cancel();
        if let Some(pending) = self.inner.lock_state().pending_restart.take() {
            pending.task.abort();
            debug!("Pending worker restart cancelled");
        }
        self.terminate().await;
    }

    pub fn status(&self) -> WorkerStatus {
        let state = self.inner.lock_state();
        let worker = state.worker.as_ref();
        WorkerStatus {
            mode: self.inner.mode,
            running: worker.is_some(),
            pid: worker.and_then(|w| w.pid),
            launches: state.launches,
            restart_pending: state.pending_restart.is_some(),
            uptime_secs: worker.map(|w| w.started_at.elapsed().as_secs()),
        }
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn launch(self: &Arc<Self>) -> LaunchOutcome {
        if self.mode == SupervisionMode::External {
            debug!("Worker is externally managed; launch skipped");
            return LaunchOutcome::Skipped;
        }
        if self.shutdown.is_cancelled() {
            debug!("Shutdown in progress; launch skipped");
            return LaunchOutcome::Skipped;
        }

        let mut state = self.lock_state();
        if let Some(pending) = state.pending_restart.take() {
            pending.task.abort();
            debug!("Pending worker restart superseded by explicit launch");
        }
        self.launch_locked(&mut state)
    }

    fn launch_locked(self: &Arc<Self>, state: &mut State) -> LaunchOutcome {
        if let Some(worker) = &state.worker {
            debug!(pid = worker.pid, "Worker already running; launch skipped");
            return LaunchOutcome::AlreadyRunning { pid: worker.pid };
        }

        state.generation += 1;
        state.launches += 1;
        let generation = state.generation;

        info!(
            program = %self.command.program,
            args = ?self.command.args,
            generation,
            "Launching worker"
        );

        match self.command.spawn() {
            Ok(child) => {
                let pid = child.id();
                let (stop_tx, stop_rx) = oneshot::channel();
                let monitor = tokio::spawn(watch_worker(
                    Arc::downgrade(self),
                    generation,
                    child,
                    stop_rx,
                    self.terminate_timeout,
                ));
                state.worker = Some(LiveWorker {
                    generation,
                    pid,
                    started_at: Instant::now(),
                    stop_tx,
                    monitor,
                });
                info!(pid, generation, "Worker spawned");
                LaunchOutcome::Spawned { pid }
            }
            Err(e) => {
                error!(error = %e, generation, "Worker spawn failed");
                self.schedule_restart_locked(state);
                LaunchOutcome::SpawnFailed
            }
        }
    }

    /// Exit notification from the monitor of worker `generation`.
    fn on_exit(self: &Arc<Self>, generation: u64, code: Option<i32>) {
        let mut state = self.lock_state();
        match &state.worker {
            Some(worker) if worker.generation == generation => {}
            _ => {
                debug!(generation, "Exit of a worker that is no longer current");
                return;
            }
        }
        state.worker = None;
        warn!(code, generation, "Worker exited");

        if self.shutdown.is_cancelled() {
            info!("Shutdown in progress; worker will not be restarted");
            return;
        }
        self.schedule_restart_locked(&mut state);
    }

    fn schedule_restart_locked(self: &Arc<Self>, state: &mut State) {
        if self.shutdown.is_cancelled() {
            return;
        }
        if let Some(previous) = state.pending_restart.take() {
            previous.task.abort();
        }

        state.restart_seq += 1;
        let id = state.restart_seq;
        let delay = self.restart_delay;
        let inner = Arc::downgrade(self);
        let shutdown = self.shutdown.clone();

        let task = tokio::spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(delay) => {
                    if let Some(inner) = inner.upgrade() {
                        inner.fire_restart(id);
                    }
                }
                () = shutdown.cancelled() => {
                    debug!("Pending worker restart cancelled by shutdown");
                }
            }
        });
        state.pending_restart = Some(PendingRestart { id, task });
        info!(delay_ms = delay.as_millis(), "Worker restart scheduled");
    }

    fn fire_restart(self: &Arc<Self>, id: u64) {
        let mut state = self.lock_state();
        match &state.pending_restart {
            Some(pending) if pending.id == id => {}
            _ => return,
        }
        // Dropping the handle detaches the running timer task.
        state.pending_restart = None;
        if self.shutdown.is_cancelled() {
            return;
        }
        info!("Restarting worker");
        self.launch_locked(&mut state);
    }
}

/// Wait for the worker to exit on its own or for a stop request.
///
/// Holds only a weak reference so a dropped supervisor does not keep itself
/// alive; dropping it also drops `stop_tx`, which stops the worker.
async fn watch_worker(
    inner: Weak<Inner>,
    generation: u64,
    mut child: Child,
    stop_rx: oneshot::Receiver<()>,
    terminate_timeout: Duration,
) {
    let pid = child.id();
    tokio::select! {
        status = child.wait() => {
            let code = match status {
                Ok(status) => {
                    debug!(pid, %status, "Worker process ended");
                    status.code()
                }
                Err(e) => {
                    warn!(pid, error = %e, "Error waiting for worker process");
                    None
                }
            };
            if let Some(inner) = inner.upgrade() {
                inner.on_exit(generation, code);
            }
        }
        _ = stop_rx => {
            stop_child(&mut child, pid, terminate_timeout).await;
        }
    }
}

/// Graceful stop: SIGTERM, bounded wait, then SIGKILL.
async fn stop_child(child: &mut Child, pid: Option<u32>, timeout: Duration) {
    if !send_sigterm(pid) {
        if let Err(e) = child.kill().await {
            warn!(pid, error = %e, "Failed to kill worker");
        }
        return;
    }

    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => {
            info!(pid, %status, "Worker exited gracefully");
        }
        Ok(Err(e)) => {
            warn!(pid, error = %e, "Error waiting for worker");
            if let Err(e) = child.kill().await {
                warn!(pid, error = %e, "Failed to kill worker");
            }
        }
        Err(_) => {
            warn!(pid, "Timeout waiting for graceful shutdown, killing");
            if let Err(e) = child.kill().await {
                warn!(pid, error = %e, "Failed to kill worker");
            }
        }
    }
}

#[cfg(unix)]
fn send_sigterm(pid: Option<u32>) -> bool {
    let Some(pid) = pid else {
        return false;
    };
    let Ok(raw) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // SAFETY: pid is a valid process ID obtained from our own Child handle,
    // which has not been reaped yet. kill(2) with SIGTERM is safe to call on
    // any owned subprocess.
    #[allow(unsafe_code)]
    let ret = unsafe { libc::kill(raw, libc::SIGTERM) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        warn!(pid, error = %err, "Failed to send SIGTERM");
        return false;
    }
    true
}

#[cfg(not(unix))]
const fn send_sigterm(_pid: Option<u32>) -> bool {
    false
}
