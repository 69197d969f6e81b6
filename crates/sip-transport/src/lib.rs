//! Datagram transport layer for the sipline proxy
//!
//! The proxy core never touches sockets directly. It receives opaque byte
//! buffers tagged with the sender's address and hands outbound buffers back to
//! a [`Transport`] together with the endpoint they must be delivered to.
//!
//! Only UDP is provided; the [`Transport`] trait is the seam other datagram
//! carriers (or in-memory test doubles) plug into.

pub mod error;
pub mod transport;


pub use error::{Error, Result};
pub use transport::udp::UdpTransport;
pub use transport::{Transport, TransportEvent};

/// Bind a [`UdpTransport`] to `addr` with the default event channel capacity
pub async fn bind_udp(
    addr: std::net::SocketAddr,
) -> Result<(UdpTransport, tokio::sync::mpsc::Receiver<TransportEvent>)> {
    UdpTransport::bind(addr, None).await
}
