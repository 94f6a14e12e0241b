//! In-flight call table.
//!
//! Maps request ids to the oneshot slot of the caller waiting on them.
//! Responses are routed purely by id, never by arrival order.

use crate::codec::Value;
use crate::{Result, RpcError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::oneshot;

type Slot = oneshot::Sender<Result<Value>>;

struct Table {
    calls: HashMap<u64, Slot>,
    /// Set once the connection has failed; no further registrations.
    closed: Option<RpcError>,
}

/// Pending-call table plus the id counter.
pub struct PendingCalls {
    next_id: AtomicU64,
    table: Mutex<Table>,
}

impl Default for PendingCalls {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingCalls {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            table: Mutex::new(Table {
                calls: HashMap::new(),
                closed: None,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Table> {
        // A panic while holding the lock leaves the map itself consistent.
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Allocate the next id and register a slot for it.
    ///
    /// Fails with the connection's terminating error if it already closed.
    pub fn register(&self) -> Result<(u64, oneshot::Receiver<Result<Value>>)> {
        let mut table = self.lock();
        if let Some(err) = &table.closed {
            return Err(err.clone());
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        table.calls.insert(id, tx);
        Ok((id, rx))
    }

    /// Drop a registration whose request never made it onto the wire.
    pub fn cancel(&self, id: u64) {
        self.lock().calls.remove(&id);
    }

    /// Deliver a response to the caller waiting on `id`.
    ///
    /// An id with no pending entry is a protocol violation: the peer answered
    /// something never asked, or answered twice.
    pub fn resolve(&self, id: u64, error: Option<Value>, result: Value) -> Result<()> {
        let slot = self.lock().calls.remove(&id).ok_or_else(|| {
            RpcError::protocol(format!("response id {} matches no pending call", id))
        })?;
        let outcome = match error {
            Some(err) => Err(RpcError::from_remote(err)),
            None => Ok(result),
        };
        // The caller may have been dropped; that is its business.
        let _ = slot.send(outcome);
        Ok(())
    }

    /// Fail every pending call and refuse new ones.
    pub fn close(&self, err: &RpcError) {
        let calls = {
            let mut table = self.lock();
            if table.closed.is_none() {
                table.closed = Some(err.clone());
            }
            std::mem::take(&mut table.calls)
        };
        for (_, slot) in calls {
            let _ = slot.send(Err(err.clone()));
        }
    }

    pub fn len(&self) -> usize {
        self.lock().calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
