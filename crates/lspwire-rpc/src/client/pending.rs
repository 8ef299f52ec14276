//! In-flight request table

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::protocol::{Message, RequestId};

/// Receiving side of a pending entry
///
/// Resolves with the response message, or with an error once the entry is
/// released without a value (client shutdown).
pub type ResponseSlot = oneshot::Receiver<Message>;

#[derive(Default)]
struct Table {
    entries: HashMap<RequestId, oneshot::Sender<Message>>,
    closed: bool,
}

/// Maps correlation ids to single-use response slots
///
/// Cloning shares the same table.
#[derive(Clone, Default)]
pub struct PendingRequests {
    table: Arc<Mutex<Table>>,
}

impl PendingRequests {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a slot for `id`
    ///
    /// Returns `None` once the table has been closed.
    pub fn register(&self, id: RequestId) -> Option<ResponseSlot> {
        let mut table = self.table.lock();
        if table.closed {
            return None;
        }
        let (tx, rx) = oneshot::channel();
        table.entries.insert(id, tx);
        Some(rx)
    }

    /// Deliver a response to the slot for `id` and drop the entry
    ///
    /// Returns false when no entry exists (orphan response).
    pub fn complete(&self, id: &RequestId, response: Message) -> bool {
        let sender = self.table.lock().entries.remove(id);
        match sender {
            // The receiver may have timed out in the meantime; that is not an error
            Some(tx) => {
                let _ = tx.send(response);
                true
            }
            None => false,
        }
    }

    /// Remove an entry without delivering anything
    pub fn remove(&self, id: &RequestId) -> bool {
        self.table.lock().entries.remove(id).is_some()
    }

    /// Close every slot without a value and refuse further registrations
    ///
    /// Returns the number of entries released.
    pub fn close_all(&self) -> usize {
        let entries = {
            let mut table = self.table.lock();
            table.closed = true;
            std::mem::take(&mut table.entries)
        };
        // Dropping the senders wakes every receiver with a closed error
        entries.len()
    }

    /// Number of in-flight requests
    pub fn len(&self) -> usize {
        self.table.lock().entries.len()
    }

    /// Whether no requests are in flight
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of every in-flight request
    pub fn ids(&self) -> Vec<RequestId> {
        self.table.lock().entries.keys().cloned().collect()
    }
}

/// Removes an entry when the waiting request goes away
///
/// Covers timeout, cancellation, send failure and the caller dropping the
/// request future. After a normal completion the entry is already gone and
/// the removal is a no-op.
pub(crate) struct PendingGuard {
    pending: PendingRequests,
    id: RequestId,
}

impl PendingGuard {
    pub(crate) fn new(pending: PendingRequests, id: RequestId) -> Self {
        Self { pending, id }
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}
