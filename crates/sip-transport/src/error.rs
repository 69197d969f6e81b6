use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Result type for transport operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by datagram transports
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to bind to {0}: {1}")]
    BindFailed(SocketAddr, #[source] io::Error),

    #[error("Failed to send datagram to {0}: {1}")]
    SendFailed(SocketAddr, #[source] io::Error),

    #[error("Datagram too large: {0} bytes (max {1})")]
    PacketTooLarge(usize, usize),

    #[error("Transport is closed")]
    TransportClosed,
}
