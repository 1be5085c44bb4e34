use crate::error::{NodeError, Result};
use crate::network::NodeAddress;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Immutable copy of a routing table, ordered by client port
///
/// This is what travels inside a `Snapshot` message, so a receiver never
/// observes mutations that happen after the copy was taken.
#[derive(Debug, Clone, Default, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct RoutingSnapshot(BTreeMap<u16, u16>);

impl RoutingSnapshot {
    pub fn from_entries<I: IntoIterator<Item = (u16, u16)>>(entries: I) -> Self {
        RoutingSnapshot(entries.into_iter().collect())
    }

    pub fn get(&self, client_port: u16) -> Option<u16> {
        self.0.get(&client_port).copied()
    }

    pub fn contains(&self, client_port: u16) -> bool {
        self.0.contains_key(&client_port)
    }

    pub fn addresses(&self) -> impl Iterator<Item = NodeAddress> + '_ {
        self.0
            .iter()
            .map(|(client, listener)| NodeAddress::new(*client, *listener))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for RoutingSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "<Routing table>")?;
        for address in self.addresses() {
            writeln!(f, "{address}")?;
        }
        Ok(())
    }
}

/// Address book of known peers: `client_port -> listener_port`
///
/// Mutated by connection handlers, read by broadcasts. Every mutation that
/// can make the table non-empty wakes up threads blocked in
/// [`RoutingTable::wait_until_populated`].
pub struct RoutingTable {
    inner: Mutex<BTreeMap<u16, u16>>,
    populated: Condvar,
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RoutingTable {
    pub fn new() -> RoutingTable {
        RoutingTable {
            inner: Mutex::new(BTreeMap::new()),
            populated: Condvar::new(),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<u16, u16>>> {
        self.inner
            .lock()
            .map_err(|e| NodeError::Network(format!("Failed to acquire routing table lock: {e}")))
    }

    /// Insert `client_port -> listener_port` unless `client_port` is already
    /// known. Returns whether an entry was added.
    pub fn put(&self, client_port: u16, listener_port: u16) -> Result<bool> {
        let mut inner = self.lock()?;
        if inner.contains_key(&client_port) {
            return Ok(false);
        }
        inner.insert(client_port, listener_port);
        self.populated.notify_all();
        Ok(true)
    }

    pub fn remove(&self, client_port: u16) -> Result<Option<u16>> {
        let mut inner = self.lock()?;
        Ok(inner.remove(&client_port))
    }

    /// Forget the peer listening on `listener_port`: both the entry keyed by
    /// its derived client port and any entry pointing at that listener.
    /// Returns the client ports that were removed.
    pub fn remove_listener(&self, listener_port: u16) -> Result<Vec<u16>> {
        let mut inner = self.lock()?;
        let mut removed: Vec<u16> = inner
            .iter()
            .filter(|(_, listener)| **listener == listener_port)
            .map(|(client, _)| *client)
            .collect();
        if let Some(client_port) = listener_port.checked_add(1) {
            if !removed.contains(&client_port) && inner.contains_key(&client_port) {
                removed.push(client_port);
            }
        }
        for client_port in &removed {
            inner.remove(client_port);
        }
        Ok(removed)
    }

    /// Replace the whole table with a received snapshot
    pub fn replace(&self, snapshot: RoutingSnapshot) -> Result<()> {
        let mut inner = self.lock()?;
        *inner = snapshot.0;
        if !inner.is_empty() {
            self.populated.notify_all();
        }
        Ok(())
    }

    pub fn get(&self, client_port: u16) -> Result<Option<u16>> {
        Ok(self.lock()?.get(&client_port).copied())
    }

    pub fn contains(&self, client_port: u16) -> bool {
        match self.inner.lock() {
            Ok(inner) => inner.contains_key(&client_port),
            Err(_) => {
                log::error!("Failed to acquire routing table lock");
                false
            }
        }
    }

    pub fn snapshot(&self) -> Result<RoutingSnapshot> {
        Ok(RoutingSnapshot(self.lock()?.clone()))
    }

    /// Every known peer except the one identified by `local_client_port`
    pub fn broadcast_targets(&self, local_client_port: u16) -> Result<Vec<NodeAddress>> {
        let inner = self.lock()?;
        Ok(inner
            .iter()
            .filter(|(client, _)| **client != local_client_port)
            .map(|(client, listener)| NodeAddress::new(*client, *listener))
            .collect())
    }

    /// Block until the table has at least one entry or `timeout` elapses
    pub fn wait_until_populated(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.lock()?;
        while inner.is_empty() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(NodeError::Timeout(format!(
                    "routing table still empty after {timeout:?}"
                )));
            }
            let (guard, _) = self
                .populated
                .wait_timeout(inner, remaining)
                .map_err(|e| {
                    NodeError::Network(format!("Failed to wait on routing table: {e}"))
                })?;
            inner = guard;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        match self.inner.lock() {
            Ok(inner) => inner.len(),
            Err(_) => {
                log::error!("Failed to acquire routing table lock");
                0
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for RoutingTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.snapshot() {
            Ok(snapshot) => write!(f, "{snapshot}"),
            Err(e) => write!(f, "<Routing table unavailable: {e}>"),
        }
    }
}
