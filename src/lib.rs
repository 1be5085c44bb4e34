//! # Overlay Node - peer-to-peer relay for a toy blockchain
//!
//! Every node listens on a loopback port, learns the current peer set from
//! a well-known seed node, keeps a routing table of those peers and relays
//! signed transaction payloads into a local stage. Blocks, mining and
//! wallets live elsewhere; this crate only moves bytes between peers.
//!
//! ## Layout
//! - `network/`: framing, messages, routing table, discovery, connections
//! - `config/`: node settings (TOML file, environment, CLI flags)
//! - `utils/`: signature verification and the wire encoding
//! - `cli/`: command-line interface for starting nodes and sending payloads
//! - `error/`: the crate-wide error type
//!
//! ## Protocol in one paragraph
//! A node listening on port `P` always connects out from port `P + 1`, its
//! client port, which is also its identity in routing tables. A joining
//! node sends an announcement to the seed; the seed records it and replies
//! with a snapshot of its table, which the joining node adopts. Each
//! message travels as one length-prefixed frame on its own connection.

pub mod cli;
pub mod config;
pub mod error;
pub mod network;
pub mod utils;

pub use cli::{Command, NodeArgs, Opt};
pub use config::{NodeConfig, RetryPolicy, DEFAULT_SEED_PORT, LOOPBACK};
pub use error::{NodeError, Result};
pub use network::{
    BroadcastReport, DiscoveryState, EventSink, LogEventSink, Message, Node, NodeAddress,
    NodeEvent, Role, RoutingSnapshot, RoutingTable, TransactionEnvelope, TransactionStage,
};
pub use utils::{EcdsaP256Verifier, KeyPair, SignatureVerifier};
