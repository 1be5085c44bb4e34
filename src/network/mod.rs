//! Peer-to-peer overlay networking
//!
//! Each node listens on a loopback port, discovers peers through the seed,
//! keeps a routing table of known peers and stages signed transactions it
//! receives. Every exchange is one length-prefixed frame over its own
//! connection.

pub mod connector;
pub mod discovery;
pub mod events;
pub mod framing;
pub mod inbound;
pub mod message;
pub mod node;
pub mod routing_table;
pub mod server;
pub mod stage;

pub use connector::Connector;
pub use discovery::{DiscoveryState, DiscoveryTracker, Role};
pub use events::{EventSink, LogEventSink, NodeEvent};
pub use framing::{encode_frame, read_frame, write_frame};
pub use inbound::{InboundPermit, InboundTracker};
pub use message::{Message, TransactionEnvelope};
pub use node::NodeAddress;
pub use routing_table::{RoutingSnapshot, RoutingTable};
pub use server::{BroadcastReport, Node};
pub use stage::TransactionStage;
