// ABOUTME: Backend lifecycle supervisor owning the transport slot and restart policy
// ABOUTME: Starts, watches, restarts with backoff, or marks the backend permanently unavailable
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 dravr.ai

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::{watch, Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};
use tokio::time::timeout as tokio_timeout;
use tracing::{debug, error, info, warn};

use crate::codec::{self, Frame, Inbound};
use crate::config::GatewayConfig;
use crate::correlation::CorrelationTable;
use crate::process::{StderrTail, SubprocessTransport};
use crate::protocol::JsonRpcRequest;
use crate::types::{BackendState, BackendStatus, GatewayError};

/// Wire id used for the handshake `initialize` request; router ids start at 1
const HANDSHAKE_ID: u64 = 0;

/// Exclusive access to the current transport
pub type TransportSlot<'a> = AsyncMutexGuard<'a, Option<SubprocessTransport>>;

#[derive(Debug)]
struct Lifecycle {
    state: BackendState,
    generation: u64,
    restarts: u32,
}

/// Owns the backend child across generations
///
/// The transport lives behind an async mutex held by whoever is talking to
/// the child. Lifecycle bookkeeping sits behind a separate sync mutex so
/// status reads never wait on a blocked transport.
#[derive(Debug)]
pub struct Supervisor {
    config: GatewayConfig,
    table: Arc<CorrelationTable>,
    slot: AsyncMutex<Option<SubprocessTransport>>,
    lifecycle: Mutex<Lifecycle>,
    stderr_tail: Arc<StderrTail>,
    stopping: watch::Sender<bool>,
}

impl Supervisor {
    /// Create a supervisor; nothing is spawned until the first start
    pub fn new(config: GatewayConfig, table: Arc<CorrelationTable>) -> Arc<Self> {
        let stderr_tail = Arc::new(StderrTail::new(config.backend.stderr_tail_lines));
        let (stopping, _) = watch::channel(false);
        Arc::new(Self {
            config,
            table,
            slot: AsyncMutex::new(None),
            lifecycle: Mutex::new(Lifecycle {
                state: BackendState::Idle,
                generation: 0,
                restarts: 0,
            }),
            stderr_tail,
            stopping,
        })
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move to `state` unless the supervisor has been shut down
    fn set_state(&self, state: BackendState) {
        let mut lifecycle = self.lifecycle();
        if lifecycle.state != BackendState::Stopped {
            lifecycle.state = state;
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> BackendState {
        self.lifecycle().state
    }

    /// Snapshot for operators
    pub fn status(&self) -> BackendStatus {
        let lifecycle = self.lifecycle();
        BackendStatus {
            state: lifecycle.state,
            generation: lifecycle.generation,
            restarts: lifecycle.restarts,
            pending: self.table.len(),
        }
    }

    /// Upper bound on waiting for a single response line
    pub const fn stall_timeout(&self) -> Duration {
        self.config.stall_timeout
    }

    /// Default per-call deadline
    pub const fn request_timeout(&self) -> Duration {
        self.config.request_timeout
    }

    /// Fail fast when the backend can no longer serve calls
    pub fn check_dispatch(&self) -> Result<(), GatewayError> {
        match self.state() {
            BackendState::Unavailable => Err(GatewayError::backend_unavailable(
                "backend restart budget exhausted",
            )),
            BackendState::Stopped => Err(GatewayError::transport_closed("gateway is shut down")),
            _ => Ok(()),
        }
    }

    /// Resolves once [`shutdown`](Self::shutdown) has begun
    pub async fn stopping(&self) {
        let mut rx = self.stopping.subscribe();
        let _ = rx.wait_for(|stopping| *stopping).await;
    }

    /// Lock the transport slot
    pub async fn lock(&self) -> TransportSlot<'_> {
        self.slot.lock().await
    }

    /// Return a live transport, starting or restarting the child as needed
    ///
    /// # Errors
    ///
    /// Returns `Startup` when a launch fails, `BackendUnavailable` once the
    /// restart budget is spent and `TransportClosed` after shutdown.
    pub async fn ensure_running<'a>(
        self: &Arc<Self>,
        slot: &'a mut Option<SubprocessTransport>,
    ) -> Result<&'a mut SubprocessTransport, GatewayError> {
        loop {
            self.check_dispatch()?;
            match slot.as_ref().map(|t| (t.generation(), t.has_exited())) {
                Some((_, false)) => break,
                Some((generation, true)) => self.replace_dead(slot, generation).await?,
                None => self.relaunch(slot).await?,
            }
        }
        slot.as_mut()
            .ok_or_else(|| GatewayError::internal("transport slot emptied while held"))
    }

    /// Start the child eagerly
    pub async fn start(self: &Arc<Self>) -> Result<(), GatewayError> {
        let mut slot = self.lock().await;
        self.ensure_running(&mut slot).await.map(|_| ())
    }

    /// Launch into an empty slot, charging the restart budget unless this is
    /// the very first start
    async fn relaunch(self: &Arc<Self>, slot: &mut Option<SubprocessTransport>) -> Result<(), GatewayError> {
        let (first, performed) = {
            let lifecycle = self.lifecycle();
            (lifecycle.state == BackendState::Idle, lifecycle.restarts)
        };

        if !first {
            let policy = self.config.restart;
            if !policy.allows(performed) {
                self.set_state(BackendState::Unavailable);
                error!(
                    restarts = performed,
                    max_restarts = policy.max_restarts,
                    "Backend restart budget exhausted, failing calls fast"
                );
                return Err(GatewayError::backend_unavailable(
                    "backend restart budget exhausted",
                ));
            }
            let delay = policy.delay_for(performed);
            {
                let mut lifecycle = self.lifecycle();
                lifecycle.restarts += 1;
                lifecycle.state = BackendState::Restarting;
            }
            info!(attempt = performed + 1, ?delay, "Restarting backend");
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = self.stopping() => {
                    return Err(GatewayError::transport_closed("gateway is shut down"));
                }
            }
        }

        match self.launch().await {
            Ok(transport) => {
                self.watch_exit(&transport);
                *slot = Some(transport);
                self.set_state(BackendState::Running);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Backend launch failed");
                self.set_state(BackendState::Restarting);
                Err(e)
            }
        }
    }

    /// Spawn the next generation and run the optional handshake
    async fn launch(&self) -> Result<SubprocessTransport, GatewayError> {
        let generation = {
            let mut lifecycle = self.lifecycle();
            lifecycle.generation += 1;
            lifecycle.generation
        };
        let mut transport =
            SubprocessTransport::start(&self.config.backend, Arc::clone(&self.stderr_tail), generation)
                .await?;
        if self.config.backend.handshake {
            self.handshake(&mut transport).await?;
        }
        Ok(transport)
    }

    /// Exchange `initialize` / `notifications/initialized` with a fresh child
    async fn handshake(&self, transport: &mut SubprocessTransport) -> Result<(), GatewayError> {
        let request = JsonRpcRequest::initialize().with_id(HANDSHAKE_ID.into());
        transport.write_line(&codec::encode(&request)?).await?;

        loop {
            let frame = tokio_timeout(self.config.stall_timeout, transport.read_line())
                .await
                .map_err(|_| GatewayError::startup("backend did not answer initialize"))??;
            let Frame::Line(line) = frame else {
                return Err(GatewayError::startup("oversized initialize response"));
            };
            if line.trim().is_empty() {
                continue;
            }
            match codec::classify(&line).map_err(GatewayError::into_caller_facing)? {
                Inbound::Notification(method) => {
                    debug!(method, "Skipping backend notification during handshake");
                }
                Inbound::Response(response) => {
                    let result = response.into_result().map_err(|e| {
                        GatewayError::startup(format!("backend rejected initialize: {e}"))
                    })?;
                    debug!(
                        generation = transport.generation(),
                        server = %result.get("serverInfo").unwrap_or(&serde_json::Value::Null),
                        "Backend initialized"
                    );
                    break;
                }
            }
        }

        let notification = JsonRpcRequest::initialized_notification();
        transport.write_line(&codec::encode(&notification)?).await
    }

    /// Restart eagerly when a child dies while nobody is talking to it
    fn watch_exit(self: &Arc<Self>, transport: &SubprocessTransport) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let mut exit_rx = transport.exit_watch();
        let generation = transport.generation();
        tokio::spawn(async move {
            if exit_rx.wait_for(Option::is_some).await.is_err() {
                return;
            }
            let Some(supervisor) = weak.upgrade() else {
                return;
            };
            if supervisor.state() == BackendState::Stopped {
                return;
            }
            let mut slot = supervisor.lock().await;
            supervisor.recover(&mut slot, generation).await;
        });
    }

    /// Handle the loss of `dead_generation`
    ///
    /// Idempotent: does nothing when the slot already holds a newer
    /// generation. Fails every entry written under the dead generation with
    /// `TransportRestarted`, then restarts if the policy permits.
    pub async fn recover(self: &Arc<Self>, slot: &mut Option<SubprocessTransport>, dead_generation: u64) {
        if let Err(e) = self.replace_dead(slot, dead_generation).await {
            debug!(error = %e, "Restart deferred");
        }
    }

    /// [`recover`](Self::recover), reporting a failed relaunch to the caller
    async fn replace_dead(
        self: &Arc<Self>,
        slot: &mut Option<SubprocessTransport>,
        dead_generation: u64,
    ) -> Result<(), GatewayError> {
        if slot.as_ref().map(SubprocessTransport::generation) != Some(dead_generation) {
            return Ok(());
        }
        let Some(transport) = slot.take() else {
            return Ok(());
        };

        let failed = self
            .table
            .fail_generation(dead_generation, || GatewayError::transport_restarted(dead_generation));
        let exit = transport.stop(Duration::ZERO).await;
        warn!(
            generation = dead_generation,
            ?exit,
            failed,
            stderr_tail = %self.stderr_tail.render(),
            "Backend exited unexpectedly"
        );

        if self.state() == BackendState::Stopped {
            return Ok(());
        }
        self.set_state(BackendState::Restarting);
        self.relaunch(slot).await
    }

    /// Stop the backend and fail everything still waiting
    pub async fn shutdown(&self) {
        self.lifecycle().state = BackendState::Stopped;
        self.stopping.send_replace(true);
        let failed = self
            .table
            .fail_all(|| GatewayError::transport_closed("gateway is shut down"));

        let transport = self.lock().await.take();
        if let Some(transport) = transport {
            let generation = transport.generation();
            let exit = transport.stop(self.config.backend.stop_timeout).await;
            info!(generation, ?exit, failed, "Backend shut down");
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::{BackendConfig, RestartPolicy};
    use crate::types::ErrorKind;
    use std::path::PathBuf;

    fn config(dir: &tempfile::TempDir, body: &str) -> GatewayConfig {
        let script = dir.path().join("backend.sh");
        std::fs::write(&script, body).expect("write script");
        let backend = BackendConfig::new(PathBuf::from("/bin/sh"))
            .with_args(vec![script.display().to_string(), "stdio".to_owned()])
            .with_startup_grace(Duration::from_millis(50));
        GatewayConfig::new(backend).with_restart(RestartPolicy {
            max_restarts: 2,
            backoff: Duration::from_millis(10),
        })
    }

    const IDLE: &str = "while IFS= read -r line; do :; done\n";

    #[tokio::test]
    async fn start_moves_to_running() {
        let dir = tempfile::tempdir().expect("tempdir");
        let supervisor = Supervisor::new(config(&dir, IDLE), Arc::new(CorrelationTable::new()));
        assert_eq!(supervisor.state(), BackendState::Idle);
        supervisor.start().await.expect("start");
        let status = supervisor.status();
        assert_eq!(status.state, BackendState::Running);
        assert_eq!(status.generation, 1);
        assert_eq!(status.restarts, 0);
        supervisor.shutdown().await;
        assert_eq!(supervisor.state(), BackendState::Stopped);
        assert_eq!(
            supervisor.check_dispatch().expect_err("stopped").kind,
            ErrorKind::TransportClosed
        );
    }

    #[tokio::test]
    async fn recover_is_idempotent_per_generation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let supervisor = Supervisor::new(config(&dir, IDLE), Arc::new(CorrelationTable::new()));
        supervisor.start().await.expect("start");

        let mut slot = supervisor.lock().await;
        supervisor.recover(&mut slot, 1).await;
        assert_eq!(slot.as_ref().map(SubprocessTransport::generation), Some(2));
        supervisor.recover(&mut slot, 1).await;
        assert_eq!(slot.as_ref().map(SubprocessTransport::generation), Some(2));
        drop(slot);

        assert_eq!(supervisor.status().restarts, 1);
        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn exhausted_budget_becomes_unavailable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = config(&dir, IDLE).with_restart(RestartPolicy::disabled());
        let supervisor = Supervisor::new(config, Arc::new(CorrelationTable::new()));
        supervisor.start().await.expect("start");

        let mut slot = supervisor.lock().await;
        supervisor.recover(&mut slot, 1).await;
        assert!(slot.is_none());
        drop(slot);

        assert_eq!(supervisor.state(), BackendState::Unavailable);
        assert_eq!(
            supervisor.check_dispatch().expect_err("unavailable").kind,
            ErrorKind::BackendUnavailable
        );
    }

    #[tokio::test]
    async fn handshake_runs_on_start() {
        let dir = tempfile::tempdir().expect("tempdir");
        let script = r#"IFS= read -r line
printf '{"jsonrpc":"2.0","method":"notifications/message","params":{}}\n'
printf '{"jsonrpc":"2.0","id":0,"result":{"serverInfo":{"name":"fake"}}}\n'
IFS= read -r line
case "$line" in *notifications/initialized*) ;; *) exit 9 ;; esac
while IFS= read -r line; do :; done
"#;
        let mut config = config(&dir, script);
        config.backend = config.backend.with_handshake(true);
        let supervisor = Supervisor::new(config, Arc::new(CorrelationTable::new()));
        supervisor.start().await.expect("handshake");
        assert_eq!(supervisor.state(), BackendState::Running);
        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn failed_restart_of_a_dead_child_is_charged_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let marker = dir.path().join("started");
        let script = format!(
            "if [ ! -e '{marker}' ]; then\n  : > '{marker}'\n  sleep 0.2\n  exit 0\nfi\nexit 1\n",
            marker = marker.display()
        );
        let supervisor = Supervisor::new(config(&dir, &script), Arc::new(CorrelationTable::new()));
        supervisor.start().await.expect("first start");

        let mut slot = supervisor.lock().await;
        let mut exit_rx = slot.as_ref().expect("transport").exit_watch();
        exit_rx.wait_for(Option::is_some).await.expect("exit observed");

        let err = supervisor
            .ensure_running(&mut slot)
            .await
            .expect_err("relaunch fails");
        assert_eq!(err.kind, ErrorKind::Startup);
        drop(slot);
        assert_eq!(supervisor.status().restarts, 1);
        supervisor.shutdown().await;
    }
}
