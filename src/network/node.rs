use crate::error::{NodeError, Result};
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};

/// Address of one overlay node
///
/// `client_port` is the port every outbound connection of the node is bound
/// to, and doubles as the node's identity in routing tables.
/// `listener_port` is where the node accepts connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeAddress {
    client_port: u16,
    listener_port: u16,
}

impl NodeAddress {
    pub fn new(client_port: u16, listener_port: u16) -> NodeAddress {
        NodeAddress {
            client_port,
            listener_port,
        }
    }

    /// The address of a node listening on `listener_port`; its client port
    /// is the next port up
    pub fn for_listener(listener_port: u16) -> Result<NodeAddress> {
        let client_port = listener_port.checked_add(1).ok_or_else(|| {
            NodeError::Config(format!("No client port above listener port {listener_port}"))
        })?;
        Ok(NodeAddress::new(client_port, listener_port))
    }

    pub fn client_port(&self) -> u16 {
        self.client_port
    }

    pub fn listener_port(&self) -> u16 {
        self.listener_port
    }

    pub fn listener_socket(&self, host: Ipv4Addr) -> SocketAddr {
        SocketAddr::from((host, self.listener_port))
    }

    pub fn client_socket(&self, host: Ipv4Addr) -> SocketAddr {
        SocketAddr::from((host, self.client_port))
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Client: {}, Listener: {}",
            self.client_port, self.listener_port
        )
    }
}
