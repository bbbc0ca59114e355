// ABOUTME: Request router serializing callers onto the single backend transport
// ABOUTME: Assigns wire ids, queues jobs for the transport worker, and awaits correlated responses
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 dravr.ai

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{timeout as tokio_timeout, timeout_at, Instant};
use tracing::{debug, warn};

use crate::codec::{self, Frame, Inbound};
use crate::correlation::{CorrelationTable, Outcome};
use crate::normalize::normalize;
use crate::protocol::{JsonRpcRequest, JsonRpcResponse};
use crate::process::SubprocessTransport;
use crate::supervisor::Supervisor;
use crate::types::{ErrorKind, GatewayError};

/// Work handed to the transport worker
#[derive(Debug)]
enum Job {
    /// Write a request and read its response
    Call { wire_id: u64, method: String, line: String },
    /// Write a notification; nothing is read back
    Notify { method: String, line: String },
}

/// A dispatched request awaiting its response
///
/// Dropping it before [`wait`](Self::wait) completes abandons the
/// correlation entry; a response arriving later is discarded.
#[derive(Debug)]
pub struct PendingCall {
    wire_id: u64,
    caller_id: Option<Value>,
    method: String,
    deadline: Instant,
    rx: oneshot::Receiver<Outcome>,
    table: Arc<CorrelationTable>,
}

impl PendingCall {
    /// Gateway-assigned id written to the backend
    pub const fn wire_id(&self) -> u64 {
        self.wire_id
    }

    /// Wait for the response or the deadline
    ///
    /// The response carries the caller's original id.
    ///
    /// # Errors
    ///
    /// Returns `Timeout` when the deadline passes, or whatever failure the
    /// worker or supervisor delivered for this entry.
    pub async fn wait(mut self) -> Result<JsonRpcResponse, GatewayError> {
        let outcome = match timeout_at(self.deadline, &mut self.rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) if Instant::now() >= self.deadline => Err(self.timed_out()),
            Ok(Err(_)) => Err(GatewayError::transport_closed("router dropped the request")),
            Err(_) => {
                if self.table.abandon(self.wire_id) {
                    warn!(id = self.wire_id, method = %self.method, "Call timed out");
                    return Err(self.timed_out());
                }
                // resolved while the deadline fired
                self.rx.try_recv().unwrap_or_else(|_| Err(self.timed_out()))
            }
        };
        outcome.map(|mut response| {
            response.id = self.caller_id.take();
            response
        })
    }

    fn timed_out(&self) -> GatewayError {
        timed_out(&self.method)
    }
}

fn timed_out(method: &str) -> GatewayError {
    GatewayError::timeout(format!("{method} timed out waiting for the backend"))
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        if self.table.abandon(self.wire_id) {
            debug!(id = self.wire_id, "Caller abandoned pending call");
        }
    }
}

/// Multiplexes many callers onto the backend
///
/// One worker task owns all reads and writes; at most one request is in
/// flight on the child at any time, so responses resolve strictly FIFO.
#[derive(Debug)]
pub struct Router {
    supervisor: Arc<Supervisor>,
    table: Arc<CorrelationTable>,
    queue: mpsc::UnboundedSender<Job>,
    next_id: AtomicU64,
}

impl Router {
    /// Create a router and spawn its transport worker
    pub fn new(supervisor: Arc<Supervisor>, table: Arc<CorrelationTable>) -> Self {
        let (queue, jobs) = mpsc::unbounded_channel();
        tokio::spawn(run_worker(jobs, Arc::clone(&supervisor), Arc::clone(&table)));
        Self {
            supervisor,
            table,
            queue,
            next_id: AtomicU64::new(1),
        }
    }

    /// Queue a request and return a handle to its response
    ///
    /// # Errors
    ///
    /// Returns `BackendUnavailable` when the supervisor has given up,
    /// `TransportClosed` after shutdown and `Encoding` for unencodable input.
    pub fn dispatch(
        &self,
        request: JsonRpcRequest,
        timeout: Duration,
    ) -> Result<PendingCall, GatewayError> {
        self.supervisor.check_dispatch()?;

        let wire_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let caller_id = request.id.clone();
        let method = request.method.clone();
        let line = codec::encode(&request.with_id(Value::from(wire_id)))?;

        let deadline = Instant::now() + timeout;
        let rx = self.table.register(wire_id, deadline);
        if self
            .queue
            .send(Job::Call {
                wire_id,
                method: method.clone(),
                line,
            })
            .is_err()
        {
            self.table.abandon(wire_id);
            return Err(GatewayError::transport_closed("transport worker stopped"));
        }
        debug!(id = wire_id, method = %method, "Dispatched request");

        Ok(PendingCall {
            wire_id,
            caller_id,
            method,
            deadline,
            rx,
            table: Arc::clone(&self.table),
        })
    }

    /// Queue a notification; it is written in order with requests
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` when the envelope carries an id.
    pub fn notify(&self, notification: &JsonRpcRequest) -> Result<(), GatewayError> {
        if !notification.is_notification() {
            return Err(GatewayError::invalid_request(
                crate::protocol::INVALID_REQUEST,
                "notifications must not carry an id",
            ));
        }
        self.supervisor.check_dispatch()?;
        let line = codec::encode(notification)?;
        self.queue
            .send(Job::Notify {
                method: notification.method.clone(),
                line,
            })
            .map_err(|_| GatewayError::transport_closed("transport worker stopped"))
    }

    /// Dispatch and wait; the response keeps any upstream `error` object
    pub async fn call(
        &self,
        request: JsonRpcRequest,
        timeout: Duration,
    ) -> Result<JsonRpcResponse, GatewayError> {
        self.dispatch(request, timeout)?.wait().await
    }

    /// `tools/list`, returning the raw `result`
    pub async fn list_tools(&self, timeout: Duration) -> Result<Value, GatewayError> {
        self.call(JsonRpcRequest::tools_list(), timeout)
            .await?
            .into_result()
    }

    /// `tools/call`, returning the normalized result
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
        timeout: Duration,
    ) -> Result<Value, GatewayError> {
        let request = JsonRpcRequest::tools_call(name, arguments);
        let result = self.call(request, timeout).await?.into_result()?;
        Ok(normalize(result))
    }

    /// Correlation entries still awaiting a response
    pub fn pending(&self) -> usize {
        self.table.len()
    }
}

/// Drain the job queue until every sender is gone
async fn run_worker(
    mut jobs: mpsc::UnboundedReceiver<Job>,
    supervisor: Arc<Supervisor>,
    table: Arc<CorrelationTable>,
) {
    while let Some(job) = jobs.recv().await {
        match job {
            Job::Call {
                wire_id,
                method,
                line,
            } => {
                if !table.is_live(wire_id) {
                    table.resolve(wire_id, Err(timed_out(&method)));
                    debug!(id = wire_id, method = %method, "Skipping request whose caller is gone");
                    continue;
                }
                let mut slot = supervisor.lock().await;
                exchange(&supervisor, &table, &mut slot, wire_id, &method, &line).await;
            }
            Job::Notify { method, line } => {
                let mut slot = supervisor.lock().await;
                send_notification(&supervisor, &mut slot, &method, &line).await;
            }
        }
    }
    debug!("Transport worker stopped");
}

/// Write one request, retrying the write once across a restart
///
/// Returns the generation the request was written under.
async fn write_request(
    supervisor: &Arc<Supervisor>,
    slot: &mut Option<SubprocessTransport>,
    wire_id: u64,
    line: &str,
) -> Result<u64, GatewayError> {
    let mut retried = false;
    loop {
        let transport = supervisor.ensure_running(slot).await?;
        let generation = transport.generation();
        match transport.write_line(line).await {
            Ok(()) => return Ok(generation),
            Err(e) if e.is_transport_failure() && !retried => {
                warn!(id = wire_id, generation, error = %e, "Write failed, restarting backend and retrying once");
                retried = true;
                supervisor.recover(slot, generation).await;
            }
            Err(e) => {
                supervisor.recover(slot, generation).await;
                return Err(e);
            }
        }
    }
}

/// Write a request and read until its response arrives
async fn exchange(
    supervisor: &Arc<Supervisor>,
    table: &CorrelationTable,
    slot: &mut Option<SubprocessTransport>,
    wire_id: u64,
    method: &str,
    line: &str,
) {
    let generation = match write_request(supervisor, slot, wire_id, line).await {
        Ok(generation) => generation,
        Err(e) => {
            table.resolve(wire_id, Err(e));
            return;
        }
    };
    if !table.mark_in_flight(wire_id, generation) {
        debug!(id = wire_id, "Caller left after write; response will be discarded");
    }

    let outcome = loop {
        let Some(transport) = slot.as_mut() else {
            // cannot happen while the slot is held; fail the caller anyway
            break Err(GatewayError::internal("transport vanished mid-request"));
        };
        let read = tokio::select! {
            read = tokio_timeout(supervisor.stall_timeout(), transport.read_line()) => read,
            () = supervisor.stopping() => return,
        };

        let frame = match read {
            Ok(Ok(frame)) => frame,
            Ok(Err(e)) if e.kind == ErrorKind::MalformedResponse => {
                break Err(e.into_caller_facing());
            }
            Ok(Err(e)) => {
                warn!(id = wire_id, generation, error = %e, "Backend failed mid-request");
                supervisor.recover(slot, generation).await;
                return;
            }
            Err(_) => {
                warn!(
                    id = wire_id,
                    generation,
                    stall = ?supervisor.stall_timeout(),
                    "Backend stalled, restarting"
                );
                supervisor.recover(slot, generation).await;
                return;
            }
        };

        let line = match frame {
            Frame::Line(line) if line.trim().is_empty() => continue,
            Frame::Line(line) => line,
            Frame::Oversized(size) => {
                break Err(GatewayError::backend_protocol(format!(
                    "backend response of {size} bytes exceeds the frame limit"
                )));
            }
        };

        match codec::classify(&line) {
            Ok(Inbound::Notification(notification)) => {
                debug!(method = %notification, "Skipping backend notification");
            }
            Ok(Inbound::Response(response)) => {
                if response.id != Some(Value::from(wire_id)) {
                    warn!(
                        expected = wire_id,
                        received = ?response.id,
                        "Response id mismatch, resolving FIFO"
                    );
                }
                break Ok(response);
            }
            Err(e) => break Err(e.into_caller_facing()),
        }
    };

    if !table.resolve(wire_id, outcome) {
        warn!(id = wire_id, method, "Discarding late response for a caller that is gone");
    }
}

async fn send_notification(
    supervisor: &Arc<Supervisor>,
    slot: &mut Option<SubprocessTransport>,
    method: &str,
    line: &str,
) {
    let transport = match supervisor.ensure_running(slot).await {
        Ok(transport) => transport,
        Err(e) => {
            warn!(method, error = %e, "Dropping notification");
            return;
        }
    };
    let generation = transport.generation();
    if let Err(e) = transport.write_line(line).await {
        warn!(method, generation, error = %e, "Notification write failed");
        supervisor.recover(slot, generation).await;
    }
}
