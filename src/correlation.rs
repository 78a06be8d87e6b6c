//! Request/response correlation.
//!
//! ```text
//!  caller ──register(id)──► PendingRequests ◄──complete(id, msg)── reader task
//!     ▲                      { id → oneshot }
//!     └───────────── oneshot::Receiver ◄──────┘
//! ```
//!
//! An entry is registered before its request is queued for sending, so a
//! fast reply always finds it. Each entry resolves exactly once: by its
//! response, by [`PendingRequests::fail_all`] when the connection ends, or by
//! removal when the caller stops waiting.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::error::{MemstateError, Result};
use crate::message::Message;

/// Receiving side of a pending request.
pub type Completion = oneshot::Receiver<Result<Message>>;

#[derive(Default)]
struct Table {
    entries: HashMap<Uuid, oneshot::Sender<Result<Message>>>,
    closed: bool,
}

/// Table of requests awaiting a response.
#[derive(Default)]
pub struct PendingRequests {
    table: Mutex<Table>,
}

impl PendingRequests {
    /// Create an empty, open table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a completion slot for `id`.
    ///
    /// # Errors
    ///
    /// - [`MemstateError::ConnectionClosed`] once the table has been failed
    /// - [`MemstateError::Protocol`] if `id` is already pending
    pub fn register(&self, id: Uuid) -> Result<Completion> {
        let mut table = self.table.lock();
        if table.closed {
            return Err(MemstateError::ConnectionClosed);
        }
        if table.entries.contains_key(&id) {
            return Err(MemstateError::Protocol(format!(
                "request id {id} is already pending"
            )));
        }

        let (tx, rx) = oneshot::channel();
        table.entries.insert(id, tx);
        tracing::trace!(%id, pending = table.entries.len(), "registered pending request");
        Ok(rx)
    }

    /// Resolve the entry for `id` with `response`.
    ///
    /// Returns `false` if no such request is pending (unknown id, or the
    /// caller already gave up).
    pub fn complete(&self, id: Uuid, response: Message) -> bool {
        let sender = self.table.lock().entries.remove(&id);
        match sender {
            Some(tx) => {
                // Receiver may have been dropped between removal and send.
                let _ = tx.send(Ok(response));
                true
            }
            None => false,
        }
    }

    /// Drop the entry for `id` without resolving it.
    pub fn remove(&self, id: Uuid) -> bool {
        self.table.lock().entries.remove(&id).is_some()
    }

    /// Fail every pending request with [`MemstateError::ConnectionClosed`]
    /// and refuse new registrations. Returns how many were failed.
    pub fn fail_all(&self) -> usize {
        let drained: Vec<_> = {
            let mut table = self.table.lock();
            table.closed = true;
            table.entries.drain().collect()
        };

        let count = drained.len();
        for (id, tx) in drained {
            tracing::debug!(%id, "failing pending request: connection closed");
            let _ = tx.send(Err(MemstateError::ConnectionClosed));
        }
        count
    }

    /// Number of outstanding requests.
    pub fn len(&self) -> usize {
        self.table.lock().entries.len()
    }

    /// Whether no requests are outstanding.
    pub fn is_empty(&self) -> bool {
        self.table.lock().entries.is_empty()
    }

    /// Whether [`fail_all`](Self::fail_all) has run.
    pub fn is_closed(&self) -> bool {
        self.table.lock().closed
    }
}

/// Removes a pending entry when the waiting caller goes away.
///
/// Covers cancelled futures, timeouts and enqueue failures. Removing an entry
/// that was already completed is a no-op.
pub(crate) struct PendingGuard<'a> {
    pending: &'a PendingRequests,
    id: Uuid,
}

impl<'a> PendingGuard<'a> {
    pub(crate) fn new(pending: &'a PendingRequests, id: Uuid) -> Self {
        Self { pending, id }
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.pending.remove(self.id) {
            tracing::debug!(id = %self.id, "caller stopped waiting: removed pending request");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Outcome;

    fn response(id: Uuid) -> Message {
        Message::CommandResponse {
            response_to: id,
            outcome: Outcome::ok(),
        }
    }

    #[tokio::test]
    async fn test_complete_resolves_matching_slot() {
        let pending = PendingRequests::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let rx_a = pending.register(a).unwrap();
        let rx_b = pending.register(b).unwrap();

        assert!(pending.complete(b, response(b)));
        assert!(pending.complete(a, response(a)));

        assert_eq!(rx_a.await.unwrap().unwrap().response_to(), Some(a));
        assert_eq!(rx_b.await.unwrap().unwrap().response_to(), Some(b));
        assert!(pending.is_empty());
    }

    #[test]
    fn test_complete_unknown_id() {
        let pending = PendingRequests::new();
        let id = Uuid::new_v4();
        assert!(!pending.complete(id, response(id)));
    }

    #[test]
    fn test_complete_only_once() {
        let pending = PendingRequests::new();
        let id = Uuid::new_v4();
        let _rx = pending.register(id).unwrap();

        assert!(pending.complete(id, response(id)));
        assert!(!pending.complete(id, response(id)));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let pending = PendingRequests::new();
        let id = Uuid::new_v4();
        let _rx = pending.register(id).unwrap();

        assert!(matches!(
            pending.register(id),
            Err(MemstateError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn test_fail_all() {
        let pending = PendingRequests::new();
        let receivers: Vec<_> = (0..5)
            .map(|_| pending.register(Uuid::new_v4()).unwrap())
            .collect();

        assert_eq!(pending.fail_all(), 5);

        for rx in receivers {
            assert!(matches!(
                rx.await.unwrap(),
                Err(MemstateError::ConnectionClosed)
            ));
        }
        assert!(pending.is_closed());
    }

    #[test]
    fn test_register_after_fail_all() {
        let pending = PendingRequests::new();
        pending.fail_all();

        assert!(matches!(
            pending.register(Uuid::new_v4()),
            Err(MemstateError::ConnectionClosed)
        ));
    }

    #[test]
    fn test_guard_removes_entry() {
        let pending = PendingRequests::new();
        let id = Uuid::new_v4();
        let _rx = pending.register(id).unwrap();

        {
            let _guard = PendingGuard::new(&pending, id);
        }

        assert!(pending.is_empty());
        assert!(!pending.complete(id, response(id)));
    }
}
