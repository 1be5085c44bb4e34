//! Error handling for the overlay node
//!
//! Every failure a node can hit while binding, framing, relaying or
//! verifying is expressed as a [`NodeError`]. Per-connection errors are
//! logged by the connection handler; only startup errors reach `main`.

use std::fmt;

/// Result type alias for node operations
pub type Result<T> = std::result::Result<T, NodeError>;

/// Error types for overlay node operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    /// The listener port could not be bound (fatal at startup)
    Bind { port: u16, reason: String },
    /// The remote listener refused an outbound connection
    ConnectionRefused { port: u16 },
    /// Malformed or truncated frame
    Framing(String),
    /// A transaction signature did not validate
    VerificationFailure,
    /// The seed could not find the announcing peer when building a reply
    LookupMiss { port: u16 },
    /// Outbound connect attempts ran out of retry budget
    RetriesExhausted { port: u16, attempts: u32 },
    /// A blocking wait elapsed before its condition held
    Timeout(String),
    /// Other network communication errors
    Network(String),
    /// Serialization/deserialization errors
    Serialization(String),
    /// Configuration errors
    Config(String),
    /// Cryptographic operation errors
    Crypto(String),
    /// File and socket I/O errors
    Io(String),
}

impl fmt::Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeError::Bind { port, reason } => {
                write!(f, "Bind error: cannot listen on port {port}: {reason}")
            }
            NodeError::ConnectionRefused { port } => {
                write!(f, "Connection refused by port {port}")
            }
            NodeError::Framing(msg) => write!(f, "Framing error: {msg}"),
            NodeError::VerificationFailure => write!(f, "Signature verification failed"),
            NodeError::LookupMiss { port } => {
                write!(f, "No routing table entry for client port {port}")
            }
            NodeError::RetriesExhausted { port, attempts } => {
                write!(f, "Gave up connecting to port {port} after {attempts} attempts")
            }
            NodeError::Timeout(msg) => write!(f, "Timed out: {msg}"),
            NodeError::Network(msg) => write!(f, "Network error: {msg}"),
            NodeError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            NodeError::Config(msg) => write!(f, "Configuration error: {msg}"),
            NodeError::Crypto(msg) => write!(f, "Cryptographic error: {msg}"),
            NodeError::Io(msg) => write!(f, "I/O error: {msg}"),
        }
    }
}

impl std::error::Error for NodeError {}

impl From<std::io::Error> for NodeError {
    fn from(err: std::io::Error) -> Self {
        NodeError::Io(err.to_string())
    }
}

impl From<bincode::error::EncodeError> for NodeError {
    fn from(err: bincode::error::EncodeError) -> Self {
        NodeError::Serialization(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for NodeError {
    fn from(err: bincode::error::DecodeError) -> Self {
        NodeError::Framing(err.to_string())
    }
}

impl From<toml::de::Error> for NodeError {
    fn from(err: toml::de::Error) -> Self {
        NodeError::Config(err.to_string())
    }
}
