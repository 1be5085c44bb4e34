use crate::error::{NodeError, Result};
use log::debug;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

// upper bound on how long a waiting acquire goes without checking its stop flag
const STOP_CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// Tracks inbound connections being handled and caps how many run at once
///
/// The accept loop takes a [`InboundPermit`] before spawning a handler;
/// when the limit is reached it blocks until a handler finishes or the
/// listener is stopped.
pub struct InboundTracker {
    active: Mutex<Vec<SocketAddr>>,
    slot_freed: Condvar,
    max_connections: usize,
}

/// Held by a connection handler; releases its slot when dropped
pub struct InboundPermit {
    tracker: Arc<InboundTracker>,
    remote: SocketAddr,
}

impl InboundTracker {
    pub fn new(max_connections: usize) -> InboundTracker {
        InboundTracker {
            active: Mutex::new(Vec::new()),
            slot_freed: Condvar::new(),
            max_connections,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<SocketAddr>>> {
        self.active
            .lock()
            .map_err(|e| NodeError::Network(format!("Failed to acquire inbound lock: {e}")))
    }

    /// Record a connection from `remote`, waiting for a free slot first.
    /// Returns `None` without recording anything once `stop` is set.
    pub fn acquire(
        self: &Arc<Self>,
        remote: SocketAddr,
        stop: &AtomicBool,
    ) -> Result<Option<InboundPermit>> {
        let mut active = self.lock()?;
        if active.len() >= self.max_connections {
            debug!("Inbound limit {} reached, holding {remote}", self.max_connections);
        }
        while active.len() >= self.max_connections {
            if stop.load(Ordering::SeqCst) {
                return Ok(None);
            }
            active = self
                .slot_freed
                .wait_timeout(active, STOP_CHECK_INTERVAL)
                .map_err(|e| NodeError::Network(format!("Failed to wait for inbound slot: {e}")))?
                .0;
        }
        if stop.load(Ordering::SeqCst) {
            return Ok(None);
        }
        active.push(remote);
        Ok(Some(InboundPermit {
            tracker: Arc::clone(self),
            remote,
        }))
    }

    /// Wake every waiting `acquire` so it rechecks its stop flag
    pub fn wake_all(&self) {
        // taking the lock orders this after a waiter's flag check
        match self.active.lock() {
            Ok(_active) => self.slot_freed.notify_all(),
            Err(_) => log::error!("Failed to acquire inbound lock"),
        }
    }

    fn release(&self, remote: &SocketAddr) {
        match self.active.lock() {
            Ok(mut active) => {
                if let Some(idx) = active.iter().position(|x| x == remote) {
                    active.remove(idx);
                }
                self.slot_freed.notify_one();
            }
            Err(_) => log::error!("Failed to acquire inbound lock"),
        }
    }

    pub fn active_count(&self) -> usize {
        match self.active.lock() {
            Ok(active) => active.len(),
            Err(_) => {
                log::error!("Failed to acquire inbound lock");
                0
            }
        }
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }
}

impl InboundPermit {
    pub fn remote(&self) -> SocketAddr {
        self.remote
    }
}

impl Drop for InboundPermit {
    fn drop(&mut self) {
        self.tracker.release(&self.remote);
    }
}
