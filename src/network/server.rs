use crate::config::NodeConfig;
use crate::error::{NodeError, Result};
use crate::network::discovery::{self, DiscoveryState, DiscoveryTracker, Role};
use crate::network::framing::read_frame;
use crate::network::{
    Connector, EventSink, InboundTracker, LogEventSink, Message, NodeAddress, NodeEvent,
    RoutingSnapshot, RoutingTable, TransactionEnvelope, TransactionStage,
};
use crate::utils::{digest_hex, EcdsaP256Verifier, KeyPair, SignatureVerifier};
use log::{debug, error, info, warn};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const LISTEN_BACKLOG: i32 = 128;
const WAKE_TIMEOUT: Duration = Duration::from_millis(500);

/// State shared between the node handle, the accept loop and the
/// connection handlers
struct Shared {
    config: NodeConfig,
    address: NodeAddress,
    role: Role,
    routing_table: RoutingTable,
    stage: TransactionStage,
    connector: Connector,
    discovery: DiscoveryTracker,
    inbound: Arc<InboundTracker>,
    events: Arc<dyn EventSink>,
    shutdown: AtomicBool,
}

/// Outcome of a broadcast: which peers got the message and which did not
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: Vec<u16>,
    pub failed: Vec<(u16, NodeError)>,
}

/// One overlay node: a listener, a routing table and a transaction stage
pub struct Node {
    shared: Arc<Shared>,
    accept_thread: Mutex<Option<JoinHandle<()>>>,
}

impl Node {
    /// Create a node with ECDSA P-256 verification and log-backed events
    pub fn new(config: NodeConfig) -> Result<Node> {
        Self::with_components(config, Arc::new(EcdsaP256Verifier), Arc::new(LogEventSink))
    }

    pub fn with_components(
        config: NodeConfig,
        verifier: Arc<dyn SignatureVerifier>,
        events: Arc<dyn EventSink>,
    ) -> Result<Node> {
        config.validate()?;
        let address = NodeAddress::for_listener(config.listener_port)?;
        let connector = Connector::new(
            config.host,
            address.client_port(),
            config.retry.clone(),
            config.write_timeout(),
        );

        let shared = Shared {
            role: Role::for_ports(config.listener_port, config.seed_port),
            inbound: Arc::new(InboundTracker::new(config.max_inbound_connections)),
            routing_table: RoutingTable::new(),
            stage: TransactionStage::new(verifier),
            discovery: DiscoveryTracker::new(),
            shutdown: AtomicBool::new(false),
            connector,
            address,
            events,
            config,
        };

        Ok(Node {
            shared: Arc::new(shared),
            accept_thread: Mutex::new(None),
        })
    }

    pub fn address(&self) -> NodeAddress {
        self.shared.address
    }

    pub fn role(&self) -> Role {
        self.shared.role
    }

    pub fn is_seed(&self) -> bool {
        self.shared.role == Role::Seed
    }

    pub fn routing_table(&self) -> &RoutingTable {
        &self.shared.routing_table
    }

    pub fn stage(&self) -> &TransactionStage {
        &self.shared.stage
    }

    pub fn discovery_state(&self) -> DiscoveryState {
        self.shared.discovery.state()
    }

    pub fn is_listening(&self) -> bool {
        match self.accept_thread.lock() {
            Ok(handle) => handle.is_some(),
            Err(_) => false,
        }
    }

    /// Bind the listener port and start the accept loop on its own thread
    pub fn start_listener(&self) -> Result<()> {
        let mut accept_thread = self
            .accept_thread
            .lock()
            .map_err(|e| NodeError::Network(format!("Failed to acquire listener lock: {e}")))?;
        if accept_thread.is_some() {
            return Ok(());
        }

        let listener = bind_listener(&self.shared.config)?;
        info!(
            "Node ({}) listening on {}",
            self.shared.address,
            self.shared
                .address
                .listener_socket(self.shared.config.host)
        );

        self.shared.shutdown.store(false, Ordering::SeqCst);
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name(format!("listener-{}", self.shared.address.listener_port()))
            .spawn(move || accept_loop(shared, listener))?;
        *accept_thread = Some(handle);
        Ok(())
    }

    /// Stop accepting connections and wait for the accept loop to exit.
    /// Handlers already running finish on their own.
    pub fn stop_listener(&self) -> Result<()> {
        let handle = self
            .accept_thread
            .lock()
            .map_err(|e| NodeError::Network(format!("Failed to acquire listener lock: {e}")))?
            .take();
        let Some(handle) = handle else {
            return Ok(());
        };

        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.shared.inbound.wake_all();
        // the accept call only returns on a connection, so make one
        let own = self.shared.address.listener_socket(self.shared.config.host);
        if let Err(e) = TcpStream::connect_timeout(&own, WAKE_TIMEOUT) {
            debug!("Wake-up connection to {own} failed: {e}");
        }

        handle
            .join()
            .map_err(|_| NodeError::Network("Listener thread panicked".to_string()))?;
        info!("Node ({}) stopped listening", self.shared.address);
        Ok(())
    }

    /// Announce this node to the seed. The seed itself has nothing to
    /// discover and is marked discovered right away.
    pub fn join_network(&self) -> Result<()> {
        let discovery = &self.shared.discovery;
        if self.is_seed() {
            return discovery.set(DiscoveryState::Discovered);
        }

        discovery.set(DiscoveryState::Announcing)?;
        let announcement = Message::announcement(self.shared.address);
        if let Err(e) = self.send(self.shared.config.seed_port, &announcement) {
            discovery.set(DiscoveryState::Idle)?;
            return Err(e);
        }
        discovery.advance(DiscoveryState::Announcing, DiscoveryState::AwaitingSnapshot)?;
        info!(
            "Announced ({}) to seed {}",
            self.shared.address, self.shared.config.seed_port
        );
        Ok(())
    }

    pub fn wait_for_discovery(&self, timeout: Duration) -> Result<()> {
        self.shared.discovery.wait_for_discovery(timeout)
    }

    /// Send one message to the listener on `destination_port`
    pub fn send(&self, destination_port: u16, message: &Message) -> Result<()> {
        send_to(&self.shared, destination_port, message)
    }

    /// Send `message` to every known peer but this node. Waits up to the
    /// configured broadcast wait for the routing table to get an entry.
    pub fn broadcast(&self, message: &Message) -> Result<BroadcastReport> {
        let shared = &self.shared;
        shared
            .routing_table
            .wait_until_populated(shared.config.broadcast_wait())?;

        let mut report = BroadcastReport::default();
        for target in shared
            .routing_table
            .broadcast_targets(shared.address.client_port())?
        {
            match send_to(shared, target.listener_port(), message) {
                Ok(()) => report.delivered.push(target.listener_port()),
                Err(e) => {
                    warn!("Broadcast to {} failed: {e}", target.listener_port());
                    report.failed.push((target.listener_port(), e));
                }
            }
        }
        Ok(report)
    }

    /// Sign `payload` and broadcast it as a transaction
    pub fn broadcast_transaction(&self, key: &KeyPair, payload: Vec<u8>) -> Result<BroadcastReport> {
        let envelope = TransactionEnvelope::sign(key, payload)?;
        info!(
            "Broadcasting transaction {}",
            digest_hex(&envelope.payload)
        );
        self.broadcast(&Message::Transaction(envelope))
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        if let Err(e) = self.stop_listener() {
            error!("Failed to stop listener: {e}");
        }
    }
}

fn bind_listener(config: &NodeConfig) -> Result<TcpListener> {
    let port = config.listener_port;
    let bind_error = move |e: std::io::Error| NodeError::Bind {
        port,
        reason: e.to_string(),
    };

    let socket =
        Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP)).map_err(bind_error)?;
    socket.set_reuse_address(true).map_err(bind_error)?;
    let address = SocketAddr::from((config.host, port));
    socket.bind(&SockAddr::from(address)).map_err(bind_error)?;
    socket.listen(LISTEN_BACKLOG).map_err(bind_error)?;
    Ok(socket.into())
}

fn accept_loop(shared: Arc<Shared>, listener: TcpListener) {
    for stream in listener.incoming() {
        if shared.shutdown.load(Ordering::SeqCst) {
            break;
        }

        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                error!("Error accepting connection: {e}");
                continue;
            }
        };
        let remote = match stream.peer_addr() {
            Ok(addr) => addr,
            Err(e) => {
                error!("Failed to get peer address: {e}");
                continue;
            }
        };

        let permit = match shared.inbound.acquire(remote, &shared.shutdown) {
            Ok(Some(permit)) => permit,
            Ok(None) => break,
            Err(e) => {
                error!("Dropping connection from {remote}: {e}");
                continue;
            }
        };
        shared.events.record(&NodeEvent::ConnectionAccepted { remote });

        let handler_shared = Arc::clone(&shared);
        let spawned = thread::Builder::new()
            .name(format!("conn-{}", remote.port()))
            .spawn(move || {
                let _permit = permit;
                if let Err(e) = handle_connection(&handler_shared, stream, remote) {
                    error!("Error handling connection from {remote}: {e}");
                }
            });
        if let Err(e) = spawned {
            error!("Failed to spawn handler for {remote}: {e}");
        }
    }
    debug!("Accept loop on {} exited", shared.address.listener_port());
}

/// Read the single frame a connection carries, dispatch it, close
fn handle_connection(shared: &Shared, mut stream: TcpStream, remote: SocketAddr) -> Result<()> {
    stream.set_read_timeout(Some(shared.config.read_timeout()))?;
    let message = read_frame(&mut stream, shared.config.max_frame_len);
    let _ = stream.shutdown(Shutdown::Both);
    let message = message?;

    debug!("Received {} from {remote}", message.kind());
    dispatch(shared, message, remote)
}

fn dispatch(shared: &Shared, message: Message, remote: SocketAddr) -> Result<()> {
    match message {
        Message::Announcement {
            client_port,
            listener_port,
        } => handle_announcement(shared, client_port, listener_port, remote),
        Message::Snapshot { table } => handle_snapshot(shared, table),
        Message::Transaction(envelope) => {
            handle_transaction(shared, &envelope, remote);
            Ok(())
        }
    }
}

fn handle_announcement(
    shared: &Shared,
    client_port: u16,
    listener_port: u16,
    remote: SocketAddr,
) -> Result<()> {
    if shared.role != Role::Seed {
        if shared.routing_table.put(client_port, listener_port)? {
            record_peer_added(shared, client_port, listener_port);
        }
        return Ok(());
    }

    let announced = discovery::seed_reply(
        &shared.routing_table,
        client_port,
        listener_port,
        remote.port(),
    )?;
    if announced.peer_added {
        record_peer_added(shared, client_port, listener_port);
    }

    match announced.reply {
        Ok(reply) => {
            let entries = match &reply.message {
                Message::Snapshot { table } => table.len(),
                _ => 0,
            };
            send_to(shared, reply.destination_port, &reply.message)?;
            shared.events.record(&NodeEvent::SnapshotSent {
                destination_port: reply.destination_port,
                entries,
            });
            Ok(())
        }
        Err(NodeError::LookupMiss { port }) => {
            shared
                .events
                .record(&NodeEvent::SnapshotReplySkipped { remote_port: port });
            Ok(())
        }
        Err(e) => Err(e),
    }
}

fn handle_snapshot(shared: &Shared, table: RoutingSnapshot) -> Result<()> {
    let entries = table.len();
    discovery::apply_snapshot(&shared.routing_table, &shared.discovery, table)?;
    shared
        .events
        .record(&NodeEvent::RoutingTableReplaced { entries });
    debug!("{}", shared.routing_table);
    Ok(())
}

fn handle_transaction(shared: &Shared, envelope: &TransactionEnvelope, sender: SocketAddr) {
    match shared.stage.stage(envelope) {
        Ok(()) => shared.events.record(&NodeEvent::TransactionStaged {
            sender,
            digest: digest_hex(&envelope.payload),
        }),
        Err(NodeError::VerificationFailure) => {
            shared
                .events
                .record(&NodeEvent::TransactionRejected { sender })
        }
        Err(e) => error!("Failed to stage transaction from {sender}: {e}"),
    }
}

fn record_peer_added(shared: &Shared, client_port: u16, listener_port: u16) {
    shared.events.record(&NodeEvent::PeerAdded {
        client_port,
        listener_port,
    });
    debug!("{}", shared.routing_table);
}

/// Outbound send; a refused connection means the peer is gone
fn send_to(shared: &Shared, destination_port: u16, message: &Message) -> Result<()> {
    let result = shared.connector.send(destination_port, message);
    if let Err(NodeError::ConnectionRefused { port }) = &result {
        for client_port in shared.routing_table.remove_listener(*port)? {
            shared
                .events
                .record(&NodeEvent::PeerRemoved { client_port });
        }
        debug!("{}", shared.routing_table);
    }
    result
}
