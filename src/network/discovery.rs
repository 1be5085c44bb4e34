//! Peer discovery through the seed node
//!
//! A joining peer announces its address to the seed and waits for a
//! routing snapshot. The seed records every announcement and answers it
//! with its current table.

use crate::error::{NodeError, Result};
use crate::network::{Message, RoutingSnapshot, RoutingTable};
use log::warn;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Whether a node is the seed or a peer joining through it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Seed,
    Joining,
}

impl Role {
    pub fn for_ports(listener_port: u16, seed_port: u16) -> Role {
        if listener_port == seed_port {
            Role::Seed
        } else {
            Role::Joining
        }
    }
}

/// Progress of a joining peer. The seed goes straight to `Discovered`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryState {
    Idle,
    Announcing,
    AwaitingSnapshot,
    Discovered,
}

pub struct DiscoveryTracker {
    state: Mutex<DiscoveryState>,
    changed: Condvar,
}

impl Default for DiscoveryTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl DiscoveryTracker {
    pub fn new() -> DiscoveryTracker {
        DiscoveryTracker {
            state: Mutex::new(DiscoveryState::Idle),
            changed: Condvar::new(),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, DiscoveryState>> {
        self.state
            .lock()
            .map_err(|e| NodeError::Network(format!("Failed to acquire discovery lock: {e}")))
    }

    pub fn state(&self) -> DiscoveryState {
        match self.state.lock() {
            Ok(state) => *state,
            Err(_) => {
                log::error!("Failed to acquire discovery lock");
                DiscoveryState::Idle
            }
        }
    }

    pub fn set(&self, next: DiscoveryState) -> Result<()> {
        let mut state = self.lock()?;
        *state = next;
        self.changed.notify_all();
        Ok(())
    }

    /// Move to `next` only if the current state is `expected`. A snapshot
    /// that lands while the announcement is still being written must not be
    /// overwritten by the late `AwaitingSnapshot` transition.
    pub fn advance(&self, expected: DiscoveryState, next: DiscoveryState) -> Result<bool> {
        let mut state = self.lock()?;
        if *state != expected {
            return Ok(false);
        }
        *state = next;
        self.changed.notify_all();
        Ok(true)
    }

    pub fn wait_for_discovery(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock()?;
        while *state != DiscoveryState::Discovered {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(NodeError::Timeout(format!(
                    "no routing snapshot after {timeout:?} (state {:?})",
                    *state
                )));
            }
            let (guard, _) = self.changed.wait_timeout(state, remaining).map_err(|e| {
                NodeError::Network(format!("Failed to wait on discovery state: {e}"))
            })?;
            state = guard;
        }
        Ok(())
    }
}

/// Reply the seed owes an announcing peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedReply {
    pub destination_port: u16,
    pub message: Message,
}

/// What the seed did with one announcement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announced {
    /// Whether this announcement inserted the peer; re-announcements do not
    pub peer_added: bool,
    /// The snapshot reply, or [`NodeError::LookupMiss`] when there is nobody
    /// to send it to
    pub reply: Result<SeedReply>,
}

/// Seed side of an announcement: record the peer, then build the snapshot
/// reply for the peer behind `remote_port`, the outbound port the
/// announcement arrived from.
///
/// Conforming peers bind their outbound sockets to their client port, so
/// `remote_port` equals the announced client port. When it does not, the
/// lookup misses and the reply is skipped with [`NodeError::LookupMiss`].
/// The outer error is reserved for routing table failures.
pub fn seed_reply(
    table: &RoutingTable,
    client_port: u16,
    listener_port: u16,
    remote_port: u16,
) -> Result<Announced> {
    let peer_added = table.put(client_port, listener_port)?;

    if remote_port != client_port {
        warn!("Announcement for client port {client_port} arrived from port {remote_port}");
    }

    let reply = match table.get(remote_port)? {
        Some(destination_port) => Ok(SeedReply {
            destination_port,
            message: Message::Snapshot {
                table: table.snapshot()?,
            },
        }),
        None => Err(NodeError::LookupMiss { port: remote_port }),
    };
    Ok(Announced { peer_added, reply })
}

/// Joining side: adopt the seed's table wholesale
pub fn apply_snapshot(
    table: &RoutingTable,
    tracker: &DiscoveryTracker,
    snapshot: RoutingSnapshot,
) -> Result<()> {
    table.replace(snapshot)?;
    tracker.set(DiscoveryState::Discovered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_role_from_ports() {
        assert_eq!(Role::for_ports(65000, 65000), Role::Seed);
        assert_eq!(Role::for_ports(7000, 65000), Role::Joining);
    }

    #[test]
    fn test_seed_reply_for_first_announcement() {
        let table = RoutingTable::new();
        let announced = seed_reply(&table, 7001, 7000, 7001).unwrap();
        assert!(announced.peer_added);

        let reply = announced.reply.unwrap();
        assert_eq!(reply.destination_port, 7000);
        assert_eq!(
            reply.message,
            Message::Snapshot {
                table: RoutingSnapshot::from_entries(vec![(7001, 7000)])
            }
        );
    }

    #[test]
    fn test_seed_reply_lookup_miss_still_records_peer() {
        let table = RoutingTable::new();
        let announced = seed_reply(&table, 7001, 7000, 9999).unwrap();

        assert!(announced.peer_added);
        assert_eq!(announced.reply, Err(NodeError::LookupMiss { port: 9999 }));
        assert_eq!(table.get(7001).unwrap(), Some(7000));
    }

    #[test]
    fn test_seed_reply_uses_recorded_listener() {
        let table = RoutingTable::new();
        table.put(7001, 7000).unwrap();
        let announced = seed_reply(&table, 7001, 8000, 7001).unwrap();
        assert!(!announced.peer_added);
        assert_eq!(announced.reply.unwrap().destination_port, 7000);
    }

    #[test]
    fn test_concurrent_announcements_add_peer_once() {
        let table = Arc::new(RoutingTable::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let table = Arc::clone(&table);
                thread::spawn(move || seed_reply(&table, 7001, 7000, 7001).unwrap().peer_added)
            })
            .collect();

        let added = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|added| *added)
            .count();
        assert_eq!(added, 1);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_apply_snapshot_replaces_table() {
        let table = RoutingTable::new();
        let tracker = DiscoveryTracker::new();
        table.put(1, 2).unwrap();

        let snapshot = RoutingSnapshot::from_entries(vec![(7001, 7000), (7011, 7010)]);
        apply_snapshot(&table, &tracker, snapshot.clone()).unwrap();

        assert_eq!(table.snapshot().unwrap(), snapshot);
        assert_eq!(tracker.state(), DiscoveryState::Discovered);
    }

    #[test]
    fn test_advance_does_not_clobber_discovered() {
        let tracker = DiscoveryTracker::new();
        tracker.set(DiscoveryState::Announcing).unwrap();
        tracker.set(DiscoveryState::Discovered).unwrap();

        let moved = tracker
            .advance(DiscoveryState::Announcing, DiscoveryState::AwaitingSnapshot)
            .unwrap();
        assert!(!moved);
        assert_eq!(tracker.state(), DiscoveryState::Discovered);
    }

    #[test]
    fn test_wait_for_discovery() {
        let tracker = Arc::new(DiscoveryTracker::new());
        assert!(tracker
            .wait_for_discovery(Duration::from_millis(10))
            .is_err());

        let setter = Arc::clone(&tracker);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            setter.set(DiscoveryState::Discovered).unwrap();
        });
        tracker.wait_for_discovery(Duration::from_secs(5)).unwrap();
        handle.join().unwrap();
    }
}
