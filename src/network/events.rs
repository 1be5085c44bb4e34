use log::{debug, info, warn};
use std::net::SocketAddr;

/// Observable things a node does to its connections, routing table and stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    ConnectionAccepted { remote: SocketAddr },
    PeerAdded { client_port: u16, listener_port: u16 },
    PeerRemoved { client_port: u16 },
    RoutingTableReplaced { entries: usize },
    SnapshotSent { destination_port: u16, entries: usize },
    SnapshotReplySkipped { remote_port: u16 },
    TransactionStaged { sender: SocketAddr, digest: String },
    TransactionRejected { sender: SocketAddr },
}

/// Write-only sink for [`NodeEvent`]s
pub trait EventSink: Send + Sync {
    fn record(&self, event: &NodeEvent);
}

/// Sink that writes every event through the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn record(&self, event: &NodeEvent) {
        match event {
            NodeEvent::ConnectionAccepted { remote } => {
                debug!("Listener: connected to {}", remote.port())
            }
            NodeEvent::PeerAdded {
                client_port,
                listener_port,
            } => info!("Added peer (client {client_port}, listener {listener_port})"),
            NodeEvent::PeerRemoved { client_port } => {
                info!("Removed unreachable peer with client port {client_port}")
            }
            NodeEvent::RoutingTableReplaced { entries } => {
                info!("Routing table replaced from seed snapshot ({entries} entries)")
            }
            NodeEvent::SnapshotSent {
                destination_port,
                entries,
            } => info!("Sent routing snapshot ({entries} entries) to {destination_port}"),
            NodeEvent::SnapshotReplySkipped { remote_port } => {
                warn!("Skipped snapshot reply: no routing entry for remote port {remote_port}")
            }
            NodeEvent::TransactionStaged { sender, digest } => {
                info!("Got transaction {digest} from {}", sender.port())
            }
            NodeEvent::TransactionRejected { sender } => {
                debug!("Dropped transaction with invalid signature from {}", sender.port())
            }
        }
    }
}
