// ABOUTME: Owned stdio subprocess transport for the upstream MCP server
// ABOUTME: Spawns the sandboxed child, drains stderr, watches for exit, and frames stdin/stdout
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 dravr.ai

use std::collections::VecDeque;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout as tokio_timeout;
use tracing::{debug, info, warn};

use crate::codec::{read_frame, Frame};
use crate::config::BackendConfig;
use crate::sandbox::{apply_sandbox, SandboxPolicy};
use crate::types::GatewayError;

/// Time given to the stderr drain to flush after an early exit
const STDERR_FLUSH_WAIT: Duration = Duration::from_millis(200);

/// Target under which backend stderr lines are logged
pub const STDERR_LOG_TARGET: &str = "mcp_bridge::backend_stderr";

/// Bounded ring of the most recent stderr lines
#[derive(Debug)]
pub struct StderrTail {
    lines: Mutex<VecDeque<String>>,
    capacity: usize,
}

impl StderrTail {
    /// Create a tail keeping at most `capacity` lines
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
        }
    }

    /// Append a line, evicting the oldest when full
    pub fn push(&self, line: String) {
        if self.capacity == 0 {
            return;
        }
        let mut lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        if lines.len() == self.capacity {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    /// Copy of the retained lines, oldest first
    pub fn snapshot(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Retained lines joined for a log or error message
    pub fn render(&self) -> String {
        self.snapshot().join("\n")
    }
}

/// How a child process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitInfo {
    /// Exit code, `None` when terminated by a signal
    pub code: Option<i32>,
    /// Terminating signal number (unix only)
    pub signal: Option<i32>,
}

impl ExitInfo {
    fn from_status(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;
        Self {
            code: status.code(),
            signal,
        }
    }
}

impl std::fmt::Display for ExitInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {code}"),
            (None, Some(signal)) => write!(f, "signal {signal}"),
            (None, None) => f.write_str("unknown status"),
        }
    }
}

/// One generation of the backend child and its pipes
///
/// The child itself is owned by a reaper task that publishes its exit on a
/// watch channel. Dropping the transport without calling [`stop`](Self::stop)
/// kills the child and aborts the stderr drain.
pub struct SubprocessTransport {
    generation: u64,
    pid: Option<u32>,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    exit_rx: watch::Receiver<Option<ExitInfo>>,
    stop_tx: Option<oneshot::Sender<Duration>>,
    stderr_task: Option<JoinHandle<()>>,
    max_frame_bytes: usize,
}

impl std::fmt::Debug for SubprocessTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubprocessTransport")
            .field("generation", &self.generation)
            .field("pid", &self.pid)
            .field("exited", &self.has_exited())
            .finish_non_exhaustive()
    }
}

impl SubprocessTransport {
    /// Spawn the backend and wait out the startup grace window
    ///
    /// # Errors
    ///
    /// Returns `Startup` if the binary cannot be spawned or the child exits
    /// before the grace window elapses; the message carries the exit code and
    /// the stderr captured so far.
    pub async fn start(
        config: &BackendConfig,
        stderr_tail: Arc<StderrTail>,
        generation: u64,
    ) -> Result<Self, GatewayError> {
        let mut cmd = Command::new(&config.binary_path);
        cmd.args(&config.args);
        apply_sandbox(&mut cmd, &SandboxPolicy::for_backend(config));
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            GatewayError::startup(format!(
                "failed to spawn {}: {e}",
                config.binary_path.display()
            ))
        })?;
        let pid = child.id();

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            return Err(GatewayError::internal("child pipes were not captured"));
        };

        let stderr_task = tokio::spawn(drain_stderr(stderr, Arc::clone(&stderr_tail), generation));

        tokio::time::sleep(config.startup_grace).await;
        match child.try_wait() {
            Ok(None) => {}
            Ok(Some(status)) => {
                let _ = tokio_timeout(STDERR_FLUSH_WAIT, stderr_task).await;
                let exit = ExitInfo::from_status(status);
                return Err(GatewayError::startup(format!(
                    "backend exited during startup ({exit}); stderr: {}",
                    stderr_tail.render()
                )));
            }
            Err(e) => {
                stderr_task.abort();
                return Err(GatewayError::startup(format!(
                    "failed to poll backend status: {e}"
                )));
            }
        }

        let (exit_tx, exit_rx) = watch::channel(None);
        let (stop_tx, stop_rx) = oneshot::channel();
        tokio::spawn(reap(child, stop_rx, exit_tx, generation));

        info!(generation, ?pid, binary = %config.binary_path.display(), "Backend started");

        Ok(Self {
            generation,
            pid,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout),
            exit_rx,
            stop_tx: Some(stop_tx),
            stderr_task: Some(stderr_task),
            max_frame_bytes: config.max_frame_bytes,
        })
    }

    /// Generation this child was started under
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the child has exited
    pub fn has_exited(&self) -> bool {
        self.exit_rx.borrow().is_some()
    }

    /// Subscribe to this child's exit
    pub fn exit_watch(&self) -> watch::Receiver<Option<ExitInfo>> {
        self.exit_rx.clone()
    }

    /// Write one encoded frame and flush it
    ///
    /// # Errors
    ///
    /// Returns `TransportClosed` when the child has exited or the pipe is broken.
    pub async fn write_line(&mut self, line: &str) -> Result<(), GatewayError> {
        let exited = *self.exit_rx.borrow();
        if let Some(exit) = exited {
            return Err(GatewayError::transport_closed(format!(
                "backend generation {} exited ({exit})",
                self.generation
            )));
        }
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(GatewayError::transport_closed("backend stdin is closed"));
        };
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| GatewayError::transport_closed(format!("write to backend failed: {e}")))?;
        stdin
            .flush()
            .await
            .map_err(|e| GatewayError::transport_closed(format!("flush to backend failed: {e}")))
    }

    /// Read one frame from the child's stdout
    ///
    /// Races the read against the exit watcher so a dead child whose stdout
    /// is held open by a descendant does not hang the caller.
    ///
    /// # Errors
    ///
    /// Returns `TransportClosed` on end of stream or exit, and
    /// `MalformedResponse` for bytes that are not UTF-8.
    pub async fn read_line(&mut self) -> Result<Frame, GatewayError> {
        let generation = self.generation;
        tokio::select! {
            biased;
            frame = read_frame(&mut self.stdout, self.max_frame_bytes) => match frame {
                Ok(Some(frame)) => Ok(frame),
                Ok(None) => Err(GatewayError::transport_closed(format!(
                    "backend generation {generation} closed stdout"
                ))),
                Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                    Err(GatewayError::malformed_response(format!("backend sent invalid UTF-8: {e}")))
                }
                Err(e) => Err(GatewayError::transport_closed(format!("read from backend failed: {e}"))),
            },
            exit = wait_exit(&mut self.exit_rx) => Err(GatewayError::transport_closed(format!(
                "backend generation {generation} exited ({})",
                exit.map_or_else(|| "unknown status".to_owned(), |e| e.to_string())
            ))),
        }
    }

    /// Stop the child gracefully
    ///
    /// Closes stdin and waits half of `timeout` for the child to exit, then
    /// sends SIGTERM and waits the rest before killing it. A zero `timeout`
    /// kills immediately.
    pub async fn stop(mut self, timeout: Duration) -> Option<ExitInfo> {
        drop(self.stdin.take());
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(timeout);
        }
        let exit = wait_exit(&mut self.exit_rx).await;
        if let Some(task) = self.stderr_task.take() {
            let _ = tokio_timeout(STDERR_FLUSH_WAIT, task).await;
        }
        debug!(generation = self.generation, ?exit, "Backend stopped");
        exit
    }
}

impl Drop for SubprocessTransport {
    fn drop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(Duration::ZERO);
        }
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
    }
}

async fn wait_exit(rx: &mut watch::Receiver<Option<ExitInfo>>) -> Option<ExitInfo> {
    rx.wait_for(Option::is_some).await.ok().and_then(|exit| *exit)
}

/// Own the child until it exits or a stop is requested
async fn reap(
    mut child: Child,
    mut stop_rx: oneshot::Receiver<Duration>,
    exit_tx: watch::Sender<Option<ExitInfo>>,
    generation: u64,
) {
    let pid = child.id();
    let status = tokio::select! {
        status = child.wait() => status,
        stop = &mut stop_rx => {
            let grace = stop.unwrap_or(Duration::ZERO);
            if grace.is_zero() {
                let _ = child.kill().await;
                child.wait().await
            } else if let Ok(status) = tokio_timeout(grace / 2, child.wait()).await {
                status
            } else {
                debug!(generation, "Backend still running after stdin close, sending SIGTERM");
                terminate(pid, generation);
                if let Ok(status) = tokio_timeout(grace - grace / 2, child.wait()).await {
                    status
                } else {
                    warn!(generation, ?grace, "Backend ignored SIGTERM, killing");
                    let _ = child.kill().await;
                    child.wait().await
                }
            }
        }
    };

    let exit = status.map_or(
        ExitInfo {
            code: None,
            signal: None,
        },
        ExitInfo::from_status,
    );
    debug!(generation, %exit, "Backend exited");
    let _ = exit_tx.send(Some(exit));
}

/// Ask the child to exit
#[cfg(unix)]
fn terminate(pid: Option<u32>, generation: u64) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = pid.and_then(|pid| i32::try_from(pid).ok()) else {
        return;
    };
    if let Err(e) = kill(Pid::from_raw(pid), Signal::SIGTERM) {
        debug!(generation, pid, error = %e, "SIGTERM failed");
    }
}

#[cfg(not(unix))]
const fn terminate(_pid: Option<u32>, _generation: u64) {}

/// Forward stderr lines into the tail buffer and the log
async fn drain_stderr(stderr: ChildStderr, tail: Arc<StderrTail>, generation: u64) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        info!(target: STDERR_LOG_TARGET, generation, "{line}");
        tail.push(line);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn sh_backend(dir: &tempfile::TempDir, body: &str) -> BackendConfig {
        let script = dir.path().join("backend.sh");
        std::fs::write(&script, body).expect("write script");
        BackendConfig::new(PathBuf::from("/bin/sh"))
            .with_args(vec![script.display().to_string(), "stdio".to_owned()])
            .with_startup_grace(Duration::from_millis(50))
            .with_stop_timeout(Duration::from_secs(2))
    }

    #[test]
    fn tail_keeps_latest_lines() {
        let tail = StderrTail::new(2);
        tail.push("a".to_owned());
        tail.push("b".to_owned());
        tail.push("c".to_owned());
        assert_eq!(tail.snapshot(), vec!["b", "c"]);
        assert_eq!(tail.render(), "b\nc");
    }

    #[tokio::test]
    async fn echoes_lines_through_the_child() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = sh_backend(&dir, "while IFS= read -r line; do printf '%s\\n' \"$line\"; done\n");
        let mut transport = SubprocessTransport::start(&config, Arc::new(StderrTail::new(8)), 1)
            .await
            .expect("start");

        assert_eq!(transport.generation(), 1);
        transport.write_line("{\"x\":1}\n").await.expect("write");
        assert_eq!(
            transport.read_line().await.expect("read"),
            Frame::Line("{\"x\":1}".to_owned())
        );

        let exit = transport.stop(Duration::from_secs(2)).await;
        assert_eq!(
            exit,
            Some(ExitInfo {
                code: Some(0),
                signal: None
            })
        );
    }

    #[tokio::test]
    async fn early_exit_is_a_startup_error_with_stderr() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = sh_backend(&dir, "echo 'bad credentials' >&2\nexit 3\n")
            .with_startup_grace(Duration::from_millis(300));
        let err = SubprocessTransport::start(&config, Arc::new(StderrTail::new(8)), 1)
            .await
            .expect_err("startup should fail");
        assert_eq!(err.kind, crate::types::ErrorKind::Startup);
        assert!(err.message.contains("exit code 3"), "{}", err.message);
        assert!(err.message.contains("bad credentials"), "{}", err.message);
    }

    #[tokio::test]
    async fn spawn_failure_is_a_startup_error() {
        let config = BackendConfig::new(PathBuf::from("/nonexistent/github-mcp-server"));
        let err = SubprocessTransport::start(&config, Arc::new(StderrTail::new(8)), 1)
            .await
            .expect_err("spawn should fail");
        assert_eq!(err.kind, crate::types::ErrorKind::Startup);
    }

    #[tokio::test]
    async fn read_after_exit_is_transport_closed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = sh_backend(&dir, "read -r line\nexit 0\n");
        let mut transport = SubprocessTransport::start(&config, Arc::new(StderrTail::new(8)), 4)
            .await
            .expect("start");
        transport.write_line("{}\n").await.expect("write");
        let err = transport.read_line().await.expect_err("closed");
        assert_eq!(err.kind, crate::types::ErrorKind::TransportClosed);
    }

    #[tokio::test]
    async fn stderr_lines_reach_the_tail() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = sh_backend(&dir, "echo 'starting up' >&2\nwhile IFS= read -r line; do :; done\n");
        let tail = Arc::new(StderrTail::new(8));
        let transport = SubprocessTransport::start(&config, Arc::clone(&tail), 1)
            .await
            .expect("start");
        let _ = transport.stop(Duration::from_secs(2)).await;
        assert_eq!(tail.snapshot(), vec!["starting up"]);
    }

    #[tokio::test]
    async fn stop_sends_sigterm_to_a_child_ignoring_eof() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = sh_backend(&dir, "exec sleep 30\n");
        let transport = SubprocessTransport::start(&config, Arc::new(StderrTail::new(8)), 1)
            .await
            .expect("start");

        let started = std::time::Instant::now();
        let exit = transport.stop(Duration::from_secs(2)).await;
        assert!(started.elapsed() < Duration::from_secs(2), "{:?}", started.elapsed());
        assert_eq!(
            exit,
            Some(ExitInfo {
                code: None,
                signal: Some(15)
            })
        );
    }
}
