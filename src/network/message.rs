//! Wire messages
//!
//! Every frame body is one [`Message`]. The variant is carried as an
//! explicit little-endian `u32` discriminant in front of its fields:
//!
//! | tag | variant        | fields                                        |
//! |-----|----------------|-----------------------------------------------|
//! | 0   | `Announcement` | `client_port: u16`, `listener_port: u16`      |
//! | 1   | `Snapshot`     | `u64` count, then `(client, listener)` pairs  |
//! | 2   | `Transaction`  | public key, signature, data; each `u64`-prefixed |

use crate::error::Result;
use crate::network::routing_table::RoutingSnapshot;
use crate::network::NodeAddress;
use crate::utils::{serialize, KeyPair};
use std::fmt;

pub const ANNOUNCEMENT_TAG: u32 = 0;
pub const SNAPSHOT_TAG: u32 = 1;
pub const TRANSACTION_TAG: u32 = 2;

/// Signed transaction payload relayed between peers
#[derive(Clone, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct TransactionEnvelope {
    pub public_key: Vec<u8>,
    pub signature: Vec<u8>,
    pub payload: Vec<u8>,
}

impl TransactionEnvelope {
    pub fn new(public_key: Vec<u8>, signature: Vec<u8>, payload: Vec<u8>) -> Self {
        Self {
            public_key,
            signature,
            payload,
        }
    }

    /// Sign `payload` with `key` and wrap it for relaying
    pub fn sign(key: &KeyPair, payload: Vec<u8>) -> Result<Self> {
        let signature = key.sign(&payload)?;
        Ok(Self::new(key.public_key().to_vec(), signature, payload))
    }
}

impl fmt::Debug for TransactionEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionEnvelope")
            .field("public_key_len", &self.public_key.len())
            .field("signature_len", &self.signature.len())
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

/// P2P message types
#[derive(Debug, Clone, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub enum Message {
    /// Sent by a joining peer to the seed
    Announcement { client_port: u16, listener_port: u16 },
    /// Sent by the seed back to a joining peer
    Snapshot { table: RoutingSnapshot },
    /// Relayed signed transaction
    Transaction(TransactionEnvelope),
}

impl Message {
    pub fn announcement(address: NodeAddress) -> Message {
        Message::Announcement {
            client_port: address.client_port(),
            listener_port: address.listener_port(),
        }
    }

    pub fn tag(&self) -> u32 {
        match self {
            Message::Announcement { .. } => ANNOUNCEMENT_TAG,
            Message::Snapshot { .. } => SNAPSHOT_TAG,
            Message::Transaction(_) => TRANSACTION_TAG,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Message::Announcement { .. } => "announcement",
            Message::Snapshot { .. } => "snapshot",
            Message::Transaction(_) => "transaction",
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Message> {
        crate::utils::deserialize(bytes)
    }
}
