//! Proxy events
//!
//! Registrations and call lifecycle milestones. Every event goes to the
//! `tracing` log; embedders and tests can additionally receive them on a
//! channel.

use std::fmt;

use tokio::sync::mpsc;
use tracing::{error, info};

/// Something worth recording happened while routing a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyEvent {
    /// An AOR was bound to a contact
    Registered { aor: String, contact: String },
    /// An INVITE from a registered caller was accepted for routing
    CallStarted { call_id: String, origin: String, destination: String },
    /// A 200 answering an INVITE went back to the caller
    CallAccepted { call_id: String, origin: String, destination: String },
    /// A 603 answering an INVITE went back to the caller
    CallDeclined { call_id: String, origin: String, destination: String },
    /// A BYE was routed
    CallEnded { call_id: String, origin: String, destination: String },
    /// A well-formed request with a method the proxy does not handle
    UnknownRequest { line: String },
}

impl fmt::Display for ProxyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyEvent::Registered { aor, contact } => {
                write!(f, "Registered {} ({})", aor, contact)
            }
            ProxyEvent::CallStarted { call_id, origin, destination } => {
                write!(f, "[ID: {}] Call started: {} -> {}", call_id, origin, destination)
            }
            ProxyEvent::CallAccepted { call_id, origin, destination } => {
                write!(f, "[ID: {}] Call accepted: {} <- {}", call_id, origin, destination)
            }
            ProxyEvent::CallDeclined { call_id, origin, destination } => {
                write!(f, "[ID: {}] Call declined: {} <- {}", call_id, origin, destination)
            }
            ProxyEvent::CallEnded { call_id, origin, destination } => {
                write!(f, "[ID: {}] Call ended: {} -> {}", call_id, origin, destination)
            }
            ProxyEvent::UnknownRequest { line } => write!(f, "Unknown request: {}", line),
        }
    }
}

/// Log sink for [`ProxyEvent`]s, optionally mirrored onto a channel
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<ProxyEvent>>,
}

impl EventSink {
    /// Sink that only logs
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink that logs and publishes on `tx`
    pub fn with_channel(tx: mpsc::UnboundedSender<ProxyEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn emit(&self, event: ProxyEvent) {
        match &event {
            ProxyEvent::UnknownRequest { .. } => error!("{}", event),
            _ => info!("{}", event),
        }

        if let Some(tx) = &self.tx {
            // A dropped receiver only means nobody is listening any more
            let _ = tx.send(event);
        }
    }
}
