use crate::config::RetryPolicy;
use crate::error::{NodeError, Result};
use crate::network::framing::write_frame;
use crate::network::Message;
use log::{debug, warn};
use rand::Rng;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io::{self, ErrorKind};
use std::net::{Ipv4Addr, Shutdown, SocketAddr, TcpStream};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

/// Opens single-use outbound connections from the node's fixed client port
///
/// All sends of one node share the same local port, so they are serialized.
pub struct Connector {
    host: Ipv4Addr,
    client_port: u16,
    retry: RetryPolicy,
    write_timeout: Duration,
    send_lock: Mutex<()>,
}

impl Connector {
    pub fn new(
        host: Ipv4Addr,
        client_port: u16,
        retry: RetryPolicy,
        write_timeout: Duration,
    ) -> Connector {
        Connector {
            host,
            client_port,
            retry,
            write_timeout,
            send_lock: Mutex::new(()),
        }
    }

    pub fn client_port(&self) -> u16 {
        self.client_port
    }

    /// Send one framed message to the listener on `destination_port`
    ///
    /// A refused connection is reported immediately as
    /// [`NodeError::ConnectionRefused`]; other bind/connect failures are
    /// retried with exponential backoff until the retry budget runs out.
    pub fn send(&self, destination_port: u16, message: &Message) -> Result<()> {
        let _guard = self
            .send_lock
            .lock()
            .map_err(|e| NodeError::Network(format!("Failed to acquire send lock: {e}")))?;

        let mut stream = self.connect_with_retry(destination_port)?;
        debug!(
            "Client: connected to {destination_port}, sending {}",
            message.kind()
        );

        stream.set_write_timeout(Some(self.write_timeout))?;
        write_frame(&mut stream, message)?;
        let _ = stream.shutdown(Shutdown::Write);
        Ok(())
    }

    fn connect_with_retry(&self, destination_port: u16) -> Result<TcpStream> {
        let destination = SocketAddr::from((self.host, destination_port));
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.connect_once(destination) {
                Ok(stream) => return Ok(stream),
                Err(e) if e.kind() == ErrorKind::ConnectionRefused => {
                    return Err(NodeError::ConnectionRefused {
                        port: destination_port,
                    });
                }
                Err(e) if attempt >= self.retry.max_attempts => {
                    warn!("Failed to connect to {destination} after {attempt} attempts: {e}");
                    return Err(NodeError::RetriesExhausted {
                        port: destination_port,
                        attempts: attempt,
                    });
                }
                Err(e) => {
                    let delay = self.delay_after(attempt);
                    debug!("Connect attempt {attempt} to {destination} failed: {e}; retrying in {delay:?}");
                    thread::sleep(delay);
                }
            }
        }
    }

    fn connect_once(&self, destination: SocketAddr) -> io::Result<TcpStream> {
        let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        let local = SocketAddr::from((self.host, self.client_port));
        socket.bind(&SockAddr::from(local))?;
        socket.connect_timeout(&SockAddr::from(destination), self.write_timeout)?;
        Ok(socket.into())
    }

    fn delay_after(&self, attempt: u32) -> Duration {
        let base = self.retry.backoff(attempt);
        if !self.retry.jitter {
            return base;
        }
        let spread = (base.as_millis() as u64) / 2;
        base + Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::framing::read_frame;
    use std::net::TcpListener;

    fn free_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    fn quick_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff_ms: 5,
            max_backoff_ms: 20,
            jitter: false,
        }
    }

    #[test]
    fn test_refused_is_not_retried() {
        let destination = free_port();
        let connector = Connector::new(
            Ipv4Addr::LOCALHOST,
            free_port(),
            quick_retry(),
            Duration::from_secs(1),
        );

        let result = connector.send(
            destination,
            &Message::Announcement {
                client_port: 1,
                listener_port: 2,
            },
        );
        assert_eq!(
            result,
            Err(NodeError::ConnectionRefused { port: destination })
        );
    }

    #[test]
    fn test_bind_conflict_exhausts_retries() {
        // holding the client port with a listener makes every bind fail
        let occupied = TcpListener::bind("127.0.0.1:0").unwrap();
        let client_port = occupied.local_addr().unwrap().port();
        let destination = TcpListener::bind("127.0.0.1:0").unwrap();
        let destination_port = destination.local_addr().unwrap().port();

        let connector = Connector::new(
            Ipv4Addr::LOCALHOST,
            client_port,
            quick_retry(),
            Duration::from_secs(1),
        );
        let result = connector.send(
            destination_port,
            &Message::Announcement {
                client_port: 1,
                listener_port: 2,
            },
        );
        assert_eq!(
            result,
            Err(NodeError::RetriesExhausted {
                port: destination_port,
                attempts: 3
            })
        );
    }

    #[test]
    fn test_send_binds_client_port() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let destination_port = listener.local_addr().unwrap().port();
        let client_port = free_port();
        let connector = Connector::new(
            Ipv4Addr::LOCALHOST,
            client_port,
            quick_retry(),
            Duration::from_secs(1),
        );

        let message = Message::Announcement {
            client_port,
            listener_port: client_port - 1,
        };
        connector.send(destination_port, &message).unwrap();

        let (mut stream, remote) = listener.accept().unwrap();
        assert_eq!(remote.port(), client_port);
        assert_eq!(read_frame(&mut stream, 1024).unwrap(), message);
    }

    #[test]
    fn test_jitter_stays_within_half_of_backoff() {
        let mut retry = quick_retry();
        retry.jitter = true;
        let connector = Connector::new(Ipv4Addr::LOCALHOST, 1, retry, Duration::from_secs(1));

        for attempt in 1..5 {
            let base = connector.retry.backoff(attempt);
            let delay = connector.delay_after(attempt);
            assert!(delay >= base && delay <= base + base / 2);
        }
    }
}
