use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, error, info, trace};

use crate::error::{Error, Result};
use crate::transport::{Transport, TransportEvent};

// Largest payload a UDP datagram can carry over IPv4
const MAX_DATAGRAM_SIZE: usize = 65_507;
// Event channel capacity when the caller does not choose one
const DEFAULT_EVENT_CAPACITY: usize = 100;

/// UDP transport delivering raw datagrams.
///
/// Cloning is cheap; all clones share the socket and the closed flag.
#[derive(Clone)]
pub struct UdpTransport {
    shared: Arc<Shared>,
}

struct Shared {
    socket: UdpSocket,
    closed: AtomicBool,
    shutdown: Notify,
    events: mpsc::Sender<TransportEvent>,
}

impl UdpTransport {
    /// Bind to `addr` and start receiving; inbound datagrams arrive on the
    /// returned channel as [`TransportEvent::DatagramReceived`]
    pub async fn bind(
        addr: SocketAddr,
        event_capacity: Option<usize>,
    ) -> Result<(Self, mpsc::Receiver<TransportEvent>)> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| Error::BindFailed(addr, e))?;
        let bound = socket.local_addr()?;

        let (events, events_rx) = mpsc::channel(event_capacity.unwrap_or(DEFAULT_EVENT_CAPACITY));
        let transport = UdpTransport {
            shared: Arc::new(Shared {
                socket,
                closed: AtomicBool::new(false),
                shutdown: Notify::new(),
                events,
            }),
        };

        info!("Listening for SIP datagrams on udp/{}", bound);
        tokio::spawn(transport.clone().receive_loop(bound));

        Ok((transport, events_rx))
    }

    async fn receive_loop(self, bound: SocketAddr) {
        let shared = &self.shared;
        let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];

        while !self.is_closed() {
            let received = tokio::select! {
                result = shared.socket.recv_from(&mut buffer) => result,
                _ = shared.shutdown.notified() => break,
            };

            let event = match received {
                Ok((len, source)) => {
                    trace!("{} bytes from {}", len, source);
                    TransportEvent::DatagramReceived {
                        data: Bytes::copy_from_slice(&buffer[..len]),
                        source,
                        destination: bound,
                    }
                }
                Err(_) if self.is_closed() => break,
                // ICMP port-unreachable from an earlier send surfaces here on some platforms
                Err(e) => {
                    error!("recv_from on {} failed: {}", bound, e);
                    TransportEvent::Error {
                        error: e.to_string(),
                    }
                }
            };

            if shared.events.send(event).await.is_err() {
                debug!("Event receiver for {} dropped", bound);
                break;
            }
        }

        let _ = shared.events.send(TransportEvent::Closed).await;
        info!("Stopped receiving on udp/{}", bound);
    }
}

#[async_trait]
impl Transport for UdpTransport {
    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.shared.socket.local_addr()?)
    }

    async fn send_datagram(&self, data: Bytes, destination: SocketAddr) -> Result<()> {
        if self.is_closed() {
            return Err(Error::TransportClosed);
        }
        if data.len() > MAX_DATAGRAM_SIZE {
            return Err(Error::PacketTooLarge(data.len(), MAX_DATAGRAM_SIZE));
        }

        self.shared
            .socket
            .send_to(&data, destination)
            .await
            .map_err(|e| Error::SendFailed(destination, e))?;
        trace!("{} bytes to {}", data.len(), destination);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.shared.closed.store(true, Ordering::Release);
        self.shared.shutdown.notify_one();
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}

impl fmt::Debug for UdpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.shared.socket.local_addr() {
            Ok(addr) => write!(f, "UdpTransport(udp/{})", addr),
            Err(_) => f.write_str("UdpTransport(unbound)"),
        }
    }
}
