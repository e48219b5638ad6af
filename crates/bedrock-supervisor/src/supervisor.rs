//! Lifecycle owner for the single supervised server process.
//!
//! State machine: `stopped -> running -> stopping -> stopped`, plus an
//! `error` state reachable only from a failed spawn. The intentional-stop
//! flag distinguishes an operator stop (no auto-restart) from a crash
//! (auto-restart after a fixed delay); exactly one delayed restart may be
//! pending at a time and any stop/start request cancels it.
//!
//! All operations return outcome values rather than erroring; every state
//! transition publishes a `status` event, including internally triggered
//! ones.

use std::{future::Future, path::PathBuf, pin::Pin, process::ExitStatus, sync::Arc, time::Duration};

use bedrock_process::{
    CommandOutcome, Player, ProcessState, RestartOutcome, StartOutcome, StopOutcome,
};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader},
    process::{ChildStdin, Command},
    sync::{Mutex, broadcast},
    task::JoinHandle,
};

use crate::{
    bus::EventBus,
    extract::{BedrockLineMatcher, ConsoleEvent, LineMatcher},
    roster::PlayerRoster,
    support,
};

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Working directory the server is launched in.
    pub server_dir: PathBuf,
    pub command: String,
    pub args: Vec<String>,
    /// Written to the process stdin (newline-terminated) to request a
    /// graceful shutdown; the server acknowledges by exiting.
    pub stop_directive: String,
    pub auto_restart: bool,
    pub restart_delay: Duration,
    pub settle_delay: Duration,
    pub stop_wait_timeout: Duration,
}

impl SupervisorConfig {
    pub fn new(server_dir: impl Into<PathBuf>) -> Self {
        Self {
            server_dir: server_dir.into(),
            command: "./bedrock_server".to_string(),
            args: Vec::new(),
            stop_directive: "stop".to_string(),
            auto_restart: true,
            restart_delay: support::restart_delay(),
            settle_delay: support::settle_delay(),
            stop_wait_timeout: support::stop_wait_timeout(),
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: ProcessState,
    pid: Option<u32>,
    /// Set before the stop directive is written, cleared only when the
    /// close event is observed. Suppresses auto-restart for operator stops.
    stopping_intentionally: bool,
    /// At most one pending delayed restart.
    restart_task: Option<JoinHandle<()>>,
    /// Incremented per spawn so late reader/waiter callbacks from a
    /// superseded process cannot touch fresh state.
    generation: u64,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            state: ProcessState::Stopped,
            pid: None,
            stopping_intentionally: false,
            restart_task: None,
            generation: 0,
        }
    }
}

#[derive(Clone)]
pub struct Supervisor {
    config: Arc<SupervisorConfig>,
    bus: EventBus,
    inner: Arc<Mutex<Inner>>,
    /// Kept outside `inner` so a slow or blocked stdin write can never hold
    /// up state queries or the close transition.
    stdin: Arc<Mutex<Option<ChildStdin>>>,
    roster: Arc<Mutex<PlayerRoster>>,
    matcher: Arc<dyn LineMatcher>,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig, bus: EventBus) -> Self {
        Self {
            config: Arc::new(config),
            bus,
            inner: Arc::new(Mutex::new(Inner::default())),
            stdin: Arc::new(Mutex::new(None)),
            roster: Arc::new(Mutex::new(PlayerRoster::new())),
            matcher: Arc::new(BedrockLineMatcher),
        }
    }

    /// Replaces the console matching rules (e.g. for tests or a changed
    /// upstream log format).
    pub fn with_matcher(mut self, matcher: Arc<dyn LineMatcher>) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Whether a live process handle exists (running or draining a stop).
    pub async fn is_running(&self) -> bool {
        let inner = self.inner.lock().await;
        matches!(inner.state, ProcessState::Running | ProcessState::Stopping)
    }

    pub async fn status(&self) -> ProcessState {
        self.inner.lock().await.state
    }

    pub async fn players(&self) -> Vec<Player> {
        self.roster.lock().await.snapshot()
    }

    /// Boxed rather than an `async fn`: the waiter task awaits `on_close`,
    /// which in turn schedules a task awaiting `start`, and type erasure at
    /// this seam keeps the two futures from referring to each other's opaque
    /// types.
    pub fn start(&self) -> Pin<Box<dyn Future<Output = StartOutcome> + Send + '_>> {
        Box::pin(self.start_inner())
    }

    async fn start_inner(&self) -> StartOutcome {
        let mut inner = self.inner.lock().await;
        if let Some(task) = inner.restart_task.take() {
            task.abort();
        }

        if matches!(inner.state, ProcessState::Running | ProcessState::Stopping) {
            return StartOutcome::rejected("Server already running");
        }

        inner.stopping_intentionally = false;

        let mut cmd = Command::new(&self.config.command);
        cmd.args(&self.config.args)
            .current_dir(&self.config.server_dir)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                inner.state = ProcessState::Error;
                self.bus.publish_status(ProcessState::Error);
                self.bus
                    .publish_output(format!("Failed to start server: {err}"));
                tracing::error!(
                    command = %self.config.command,
                    dir = %self.config.server_dir.display(),
                    error = %err,
                    "failed to spawn server process"
                );
                return StartOutcome::rejected(err.to_string());
            }
        };

        inner.generation += 1;
        let generation = inner.generation;
        inner.pid = child.id();
        inner.state = ProcessState::Running;
        *self.stdin.lock().await = child.stdin.take();
        self.bus.publish_status(ProcessState::Running);
        tracing::info!(pid = ?inner.pid, "server process started");

        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            // Roster mutation happens only on this reader, keeping event
            // delivery single-consumer.
            readers.push(self.spawn_reader(stdout, true));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(self.spawn_reader(stderr, false));
        }

        let sup = self.clone();
        tokio::spawn(async move {
            let res = child.wait().await;
            // The pipes hit EOF once the process is gone; draining the
            // readers first means no buffered console line can repopulate
            // the roster after the close transition clears it.
            for reader in readers {
                let _ = reader.await;
            }
            sup.on_close(generation, res).await;
        });

        StartOutcome::ok()
    }

    /// Fire-and-forget: returns as soon as the stop directive is delivered;
    /// the `stopped` transition happens when the process actually exits.
    pub async fn stop(&self) -> StopOutcome {
        let pid;
        {
            let mut inner = self.inner.lock().await;
            if let Some(task) = inner.restart_task.take() {
                task.abort();
            }

            match inner.state {
                ProcessState::Running => {}
                ProcessState::Stopping => return StopOutcome::rejected("Server already stopping"),
                _ => return StopOutcome::rejected("Server not running"),
            }

            inner.state = ProcessState::Stopping;
            inner.stopping_intentionally = true;
            pid = inner.pid;
            self.bus.publish_status(ProcessState::Stopping);
            tracing::info!("stop requested");
        }

        let directive = format!("{}\n", self.config.stop_directive);
        let wrote = match self.stdin.try_lock() {
            Ok(mut slot) => match slot.as_mut() {
                Some(stdin) => {
                    let write = async {
                        stdin.write_all(directive.as_bytes()).await?;
                        stdin.flush().await
                    };
                    // A full stdin pipe means the server stopped draining
                    // commands and the directive would never get through.
                    matches!(
                        tokio::time::timeout(self.config.stop_wait_timeout, write).await,
                        Ok(Ok(()))
                    )
                }
                None => false,
            },
            // Another writer is wedged on the same pipe.
            Err(_) => false,
        };

        if !wrote {
            // The graceful channel is gone; honor the intent by force.
            terminate(pid, false);
            self.bus
                .publish_output("[process] stop directive failed, terminating".to_string());
            tracing::warn!(?pid, "stop directive write failed, sent signal instead");
        }

        StopOutcome::ok()
    }

    pub async fn restart(&self) -> RestartOutcome {
        if !self.is_running().await {
            let outcome = self.start().await;
            return if outcome.started {
                RestartOutcome::with_message("Server started")
            } else {
                RestartOutcome::rejected(
                    outcome
                        .message
                        .unwrap_or_else(|| "failed to start server".to_string()),
                )
            };
        }

        // Subscribe before stopping so the close transition cannot be missed.
        let mut status_rx = self.bus.subscribe_status();
        let stop = self.stop().await;
        if !stop.stopped {
            return RestartOutcome::rejected(
                stop.message
                    .unwrap_or_else(|| "failed to stop server".to_string()),
            );
        }

        let wait = self.config.stop_wait_timeout;
        if !wait_for_stopped(&mut status_rx, wait).await {
            // The process ignored the stop directive; kill it and give it
            // one more window to report the close.
            let pid = self.inner.lock().await.pid;
            terminate(pid, true);
            self.bus
                .publish_output("[process] server did not exit in time, killing".to_string());
            tracing::warn!(?pid, "server ignored stop directive, killed");

            if !wait_for_stopped(&mut status_rx, wait).await {
                return RestartOutcome::rejected("Server did not exit after forced termination");
            }
        }

        tokio::time::sleep(self.config.settle_delay).await;

        let outcome = self.start().await;
        if outcome.started {
            RestartOutcome::ok()
        } else {
            RestartOutcome::rejected(
                outcome
                    .message
                    .unwrap_or_else(|| "failed to start server".to_string()),
            )
        }
    }

    /// Writes `command` plus a trailing newline to the process stdin. The
    /// state check and the write take separate locks, so a process that
    /// stops draining stdin can delay other writers but never the state
    /// machine.
    pub async fn send_command(&self, command: &str) -> CommandOutcome {
        {
            let inner = self.inner.lock().await;
            if inner.state != ProcessState::Running {
                return CommandOutcome::rejected("Server not running");
            }
        }

        let payload = format!("{command}\n");
        let mut slot = self.stdin.lock().await;
        let Some(stdin) = slot.as_mut() else {
            return CommandOutcome::rejected("Server not running");
        };
        if let Err(err) = stdin.write_all(payload.as_bytes()).await {
            return CommandOutcome::rejected(err.to_string());
        }
        if let Err(err) = stdin.flush().await {
            return CommandOutcome::rejected(err.to_string());
        }
        CommandOutcome::ok()
    }

    fn spawn_reader<R>(&self, reader: R, extract: bool) -> JoinHandle<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let bus = self.bus.clone();
        let roster = self.roster.clone();
        let matcher = self.matcher.clone();
        tokio::spawn(async move {
            // lines() buffers partial writes until the newline, so a line
            // split across pipe chunks still matches.
            let mut lines = BufReader::new(reader).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                bus.publish_output(line.clone());
                if !extract {
                    continue;
                }
                match matcher.parse(&line) {
                    Some(ConsoleEvent::Joined { name, xuid }) => {
                        let mut roster = roster.lock().await;
                        roster.upsert(Player::new(name, xuid));
                        bus.publish_players(roster.snapshot());
                    }
                    Some(ConsoleEvent::Left { xuid, .. }) => {
                        let mut roster = roster.lock().await;
                        roster.remove(&xuid);
                        bus.publish_players(roster.snapshot());
                    }
                    Some(ConsoleEvent::Ping { name, ping }) => {
                        let mut roster = roster.lock().await;
                        if roster.update_ping(&name, ping) {
                            bus.publish_players(roster.snapshot());
                        }
                    }
                    None => {}
                }
            }
        })
    }

    async fn on_close(&self, generation: u64, res: std::io::Result<ExitStatus>) {
        let mut inner = self.inner.lock().await;
        if inner.generation != generation {
            // A superseded process; the current one owns the state.
            return;
        }

        inner.state = ProcessState::Stopped;
        inner.pid = None;
        let was_intentional = inner.stopping_intentionally;
        inner.stopping_intentionally = false;

        // A writer wedged on the dead process's pipe still holds the lock;
        // its write fails with EPIPE and the slot is replaced on the next
        // start, so a failed try_lock needs no cleanup.
        if let Ok(mut slot) = self.stdin.try_lock() {
            *slot = None;
        }

        self.roster.lock().await.clear();

        self.bus.publish_status(ProcessState::Stopped);
        self.bus.publish_players(Vec::new());
        let code = match &res {
            Ok(status) => status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string()),
            Err(err) => format!("unknown ({err})"),
        };
        self.bus
            .publish_output(format!("[process] server stopped with code {code}"));
        tracing::info!(exit = %code, intentional = was_intentional, "server process exited");

        if !was_intentional && self.config.auto_restart {
            let delay = self.config.restart_delay;
            self.bus.publish_output(format!(
                "[process] server stopped unexpectedly, restarting in {}ms",
                delay.as_millis()
            ));
            let sup = self.clone();
            inner.restart_task = Some(tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                sup.inner.lock().await.restart_task = None;
                let outcome = sup.start().await;
                if !outcome.started {
                    tracing::warn!(message = ?outcome.message, "auto-restart failed");
                }
            }));
        }
    }
}

async fn wait_for_stopped(rx: &mut broadcast::Receiver<ProcessState>, wait: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + wait;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return false;
        }
        match tokio::time::timeout(remaining, rx.recv()).await {
            Ok(Ok(ProcessState::Stopped)) => return true,
            Ok(Ok(_)) => continue,
            Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
            Ok(Err(broadcast::error::RecvError::Closed)) => return false,
            Err(_) => return false,
        }
    }
}

#[cfg(unix)]
fn terminate(pid: Option<u32>, force: bool) {
    let Some(pid) = pid else {
        return;
    };
    let signal = if force { libc::SIGKILL } else { libc::SIGTERM };
    unsafe {
        libc::kill(pid as libc::pid_t, signal);
    }
}

#[cfg(not(unix))]
fn terminate(_pid: Option<u32>, _force: bool) {}
