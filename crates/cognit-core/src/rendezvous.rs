//! Single-slot hand-off for the result of a synchronous call.

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::call::ExecResponse;

/// A single-slot rendezvous between the supervisor task (producer) and at
/// most one blocked application call (consumer).
///
/// There is no timeout at this layer: a per-call timeout is enforced by the
/// ECA's HTTP client and arrives here packaged as an
/// `ExecResponse { ret_code: Error, .. }`, same as any other outcome.
pub struct SyncRendezvous {
    /// The pending result, if the supervisor has produced one that hasn't
    /// been taken yet.
    slot: Mutex<Option<ExecResponse>>,
    /// Signaled whenever `put` stores a result.
    signal: Notify,
    /// Serializes concurrent `take()` callers so only one is ever waiting
    /// on the slot; a caller violating the at-most-one-sync-waiter
    /// contract simply gets queued here instead of racing.
    ticket: tokio::sync::Mutex<()>,
}

impl Default for SyncRendezvous {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncRendezvous {
    /// Creates an empty rendezvous.
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            signal: Notify::new(),
            ticket: tokio::sync::Mutex::new(()),
        }
    }

    /// Stores `result` in the slot and wakes a waiting `take()`.
    ///
    /// Returns `false` if the slot was already full, which indicates a
    /// protocol bug in the supervisor: the caller should log and discard.
    pub fn put(&self, result: ExecResponse) -> bool {
        let mut slot = self.slot.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(result);
        drop(slot);
        self.signal.notify_one();
        true
    }

    /// Waits for and returns the next result, clearing the slot.
    ///
    /// Blocks (asynchronously) while the slot is empty.
    pub async fn take(&self) -> ExecResponse {
        let _ticket = self.ticket.lock().await;
        loop {
            if let Some(result) = self.slot.lock().take() {
                return result;
            }
            self.signal.notified().await;
        }
    }
}
