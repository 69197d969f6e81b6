pub mod udp;

use std::fmt;
use std::net::SocketAddr;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Events emitted by a transport's receive loop
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A datagram arrived
    DatagramReceived {
        /// Raw payload, undecoded
        data: Bytes,
        /// Address the datagram came from
        source: SocketAddr,
        /// Local address it was received on
        destination: SocketAddr,
    },

    /// A non-fatal receive error
    Error {
        /// Error description
        error: String,
    },

    /// The receive loop has stopped
    Closed,
}

/// A datagram carrier the proxy can send through.
///
/// Sends are fire-and-forget from the proxy's point of view: a successful
/// return only means the payload was handed to the operating system.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Local address the transport is bound to
    fn local_addr(&self) -> Result<SocketAddr>;

    /// Send one datagram to `destination`
    async fn send_datagram(&self, data: Bytes, destination: SocketAddr) -> Result<()>;

    /// Stop the transport; pending receives end with [`TransportEvent::Closed`]
    async fn close(&self) -> Result<()>;

    /// Whether [`Transport::close`] has been called
    fn is_closed(&self) -> bool;
}
