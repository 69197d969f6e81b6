//! # sipline core
//!
//! Message-processing engine of a small stateless SIP proxy and registrar
//! running over UDP.
//!
//! Every inbound datagram is handled on its own: it is split into lines,
//! classified by its first line, and routed by a per-method policy. Requests
//! from registered user agents are forwarded to the registered contact of the
//! callee with this proxy's Via and Record-Route pushed on top; responses
//! travel back after the proxy pops its own Via. Requests that cannot be
//! routed are answered locally with a synthesized response.
//!
//! ## Modules
//!
//! - `message`: line-structured message model
//! - `headers`: header recognition (long and compact forms) and field extraction
//! - `registrar`: address-of-record to contact bindings
//! - `transform`: Via/Route/Record-Route/Content-Length rewriting
//! - `response`: locally synthesized responses
//! - `dispatch`: classification and routing policies
//! - `events`: proxy events (registrations, call lifecycle)
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sipline_core::{Dispatcher, ProxyConfig, ProxyIdentity, Registrar};
//! use sipline_transport::{bind_udp, Transport, TransportEvent};
//!
//! # async fn run() -> sipline_core::Result<()> {
//! let config = ProxyConfig::default();
//! let identity = ProxyIdentity::new("192.0.2.10".parse().unwrap(), config.port, &config.branch_suffix);
//! let registrar = Arc::new(Registrar::new(config.expiry_policy()));
//! let dispatcher = Dispatcher::new(&config, identity, registrar);
//!
//! let (transport, mut events) = bind_udp(config.listen_addr()).await?;
//! let transport: Arc<dyn Transport> = Arc::new(transport);
//! while let Some(TransportEvent::DatagramReceived { data, source, .. }) = events.recv().await {
//!     dispatcher.handle_datagram(&data, source, transport.clone()).await;
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod diagnostics;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod headers;
pub mod message;
pub mod registrar;
pub mod response;
pub mod transform;

pub use config::{ProxyConfig, ProxyIdentity};
pub use dispatch::{Disposition, DropReason, Dispatcher, MessageKind, Method};
pub use error::{Error, Result};
pub use events::{EventSink, ProxyEvent};
pub use headers::HeaderKind;
pub use message::Message;
pub use registrar::{ExpiryPolicy, Registrar, RegistrarEntry};
pub use response::{ResponseComposer, StatusReply};
