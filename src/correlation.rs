// ABOUTME: Correlation table mapping gateway wire ids to waiting callers
// ABOUTME: Tracks deadlines and write generations so restarts and timeouts fail the right entries
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2026 dravr.ai

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::protocol::JsonRpcResponse;
use crate::types::GatewayError;

/// What a waiting caller eventually receives
pub type Outcome = Result<JsonRpcResponse, GatewayError>;

#[derive(Debug)]
struct Entry {
    deadline: Instant,
    /// Generation the request was written under; `None` while still queued
    generation: Option<u64>,
    tx: oneshot::Sender<Outcome>,
}

/// Wire id → waiting caller
///
/// The lock is synchronous and never held across an `.await`, so timeouts
/// and restart fan-out proceed while the transport worker is blocked on a read.
#[derive(Debug, Default)]
pub struct CorrelationTable {
    entries: Mutex<HashMap<u64, Entry>>,
}

impl CorrelationTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a queued request and return the receiving half for its caller
    pub fn register(&self, id: u64, deadline: Instant) -> oneshot::Receiver<Outcome> {
        let (tx, rx) = oneshot::channel();
        self.lock().insert(
            id,
            Entry {
                deadline,
                generation: None,
                tx,
            },
        );
        rx
    }

    /// Whether the entry still has a caller waiting within its deadline
    pub fn is_live(&self, id: u64) -> bool {
        self.lock()
            .get(&id)
            .is_some_and(|entry| !entry.tx.is_closed() && entry.deadline > Instant::now())
    }

    /// Note that the request was written under `generation`
    ///
    /// Returns `false` when the caller has already gone away.
    pub fn mark_in_flight(&self, id: u64, generation: u64) -> bool {
        self.lock().get_mut(&id).is_some_and(|entry| {
            entry.generation = Some(generation);
            true
        })
    }

    /// Deliver an outcome and remove the entry
    ///
    /// Returns `false` when the entry is gone (timed out or abandoned) or the
    /// receiver was dropped; the outcome is discarded in that case.
    pub fn resolve(&self, id: u64, outcome: Outcome) -> bool {
        let entry = self.lock().remove(&id);
        entry.is_some_and(|entry| entry.tx.send(outcome).is_ok())
    }

    /// Remove an entry without delivering anything
    ///
    /// Returns `true` if the entry was still present.
    pub fn abandon(&self, id: u64) -> bool {
        self.lock().remove(&id).is_some()
    }

    /// Fail every entry written under `generation` or earlier
    ///
    /// Entries that are still queued are left in place for the next
    /// generation. Returns the number of callers notified.
    pub fn fail_generation(&self, generation: u64, error: impl Fn() -> GatewayError) -> usize {
        let failed: Vec<Entry> = {
            let mut entries = self.lock();
            let ids: Vec<u64> = entries
                .iter()
                .filter(|(_, entry)| entry.generation.is_some_and(|g| g <= generation))
                .map(|(id, _)| *id)
                .collect();
            ids.iter().filter_map(|id| entries.remove(id)).collect()
        };
        failed
            .into_iter()
            .map(|entry| entry.tx.send(Err(error())).is_ok())
            .filter(|sent| *sent)
            .count()
    }

    /// Fail every entry, queued or in flight
    pub fn fail_all(&self, error: impl Fn() -> GatewayError) -> usize {
        let drained: Vec<Entry> = self.lock().drain().map(|(_, entry)| entry).collect();
        drained
            .into_iter()
            .map(|entry| entry.tx.send(Err(error())).is_ok())
            .filter(|sent| *sent)
            .count()
    }

    /// Number of entries awaiting a response
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no entries are waiting
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ErrorKind;
    use serde_json::json;
    use std::time::Duration;

    fn far() -> Instant {
        Instant::now() + Duration::from_secs(60)
    }

    #[tokio::test]
    async fn resolve_delivers_once() {
        let table = CorrelationTable::new();
        let rx = table.register(1, far());
        let response = JsonRpcResponse::success(Some(json!(1)), json!({"ok": true}));
        assert!(table.resolve(1, Ok(response.clone())));
        assert!(!table.resolve(1, Ok(response.clone())));
        assert_eq!(rx.await.expect("delivered").expect("ok"), response);
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn abandoned_entry_discards_late_response() {
        let table = CorrelationTable::new();
        let _rx = table.register(7, far());
        assert!(table.abandon(7));
        assert!(!table.resolve(7, Ok(JsonRpcResponse::success(Some(json!(7)), json!(null)))));
    }

    #[tokio::test]
    async fn dropped_receiver_is_not_live() {
        let table = CorrelationTable::new();
        drop(table.register(3, far()));
        assert!(!table.is_live(3));
        let _rx = table.register(4, far());
        assert!(table.is_live(4));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_is_not_live() {
        let table = CorrelationTable::new();
        let _rx = table.register(5, Instant::now() + Duration::from_millis(10));
        tokio::time::advance(Duration::from_millis(20)).await;
        assert!(!table.is_live(5));
    }

    #[tokio::test]
    async fn fail_generation_spares_queued_entries() {
        let table = CorrelationTable::new();
        let written = table.register(1, far());
        let _queued = table.register(2, far());
        assert!(table.mark_in_flight(1, 3));

        let failed = table.fail_generation(3, || GatewayError::transport_restarted(3));
        assert_eq!(failed, 1);
        assert_eq!(table.len(), 1);

        let err = written.await.expect("notified").expect_err("restarted");
        assert_eq!(err.kind, ErrorKind::TransportRestarted);
    }

    #[tokio::test]
    async fn fail_all_drains_everything() {
        let table = CorrelationTable::new();
        let a = table.register(1, far());
        let b = table.register(2, far());
        assert_eq!(table.fail_all(|| GatewayError::transport_closed("stopped")), 2);
        assert!(a.await.expect("a").is_err());
        assert!(b.await.expect("b").is_err());
        assert!(table.is_empty());
    }
}
