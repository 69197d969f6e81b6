//! Message classification and routing
//!
//! The [`Dispatcher`] owns the registrar and the identity markers and turns
//! every inbound datagram into exactly one outcome, reported as a
//! [`Disposition`]. Nothing here returns an error: a message that cannot be
//! routed is answered locally or dropped, and a failed send is logged.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use sipline_transport::Transport;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::config::{ProxyConfig, ProxyIdentity};
use crate::diagnostics::hex_dump;
use crate::events::{EventSink, ProxyEvent};
use crate::headers::{self, HeaderKind, StartLine};
use crate::message::Message;
use crate::registrar::{Registrar, RegistrarEntry};
use crate::response::{relayed_reason, ResponseComposer, StatusReply};
use crate::transform;

// Unrecognized buffers up to this size are dropped without a dump
const MAX_SILENT_GARBAGE_LEN: usize = 4;

/// Request methods the proxy distinguishes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Register,
    Invite,
    Ack,
    Bye,
    Cancel,
    Options,
    Info,
    Message,
    Refer,
    Prack,
    Update,
    Subscribe,
    Publish,
    Notify,
    /// Any other token in method position
    Other(String),
}

impl Method {
    /// Method for a request-line token; matching is exact (case-sensitive)
    pub fn from_token(token: &str) -> Self {
        match token {
            "REGISTER" => Method::Register,
            "INVITE" => Method::Invite,
            "ACK" => Method::Ack,
            "BYE" => Method::Bye,
            "CANCEL" => Method::Cancel,
            "OPTIONS" => Method::Options,
            "INFO" => Method::Info,
            "MESSAGE" => Method::Message,
            "REFER" => Method::Refer,
            "PRACK" => Method::Prack,
            "UPDATE" => Method::Update,
            "SUBSCRIBE" => Method::Subscribe,
            "PUBLISH" => Method::Publish,
            "NOTIFY" => Method::Notify,
            other => Method::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::Register => "REGISTER",
            Method::Invite => "INVITE",
            Method::Ack => "ACK",
            Method::Bye => "BYE",
            Method::Cancel => "CANCEL",
            Method::Options => "OPTIONS",
            Method::Info => "INFO",
            Method::Message => "MESSAGE",
            Method::Refer => "REFER",
            Method::Prack => "PRACK",
            Method::Update => "UPDATE",
            Method::Subscribe => "SUBSCRIBE",
            Method::Publish => "PUBLISH",
            Method::Notify => "NOTIFY",
            Method::Other(token) => token,
        }
    }

    fn policy(&self) -> Policy {
        match self {
            Method::Register => Policy::Register,
            Method::Invite => Policy::Invite,
            Method::Ack => Policy::Ack,
            Method::Bye => Policy::Bye,
            Method::Cancel
            | Method::Options
            | Method::Info
            | Method::Message
            | Method::Refer
            | Method::Prack
            | Method::Update => Policy::NonInvite,
            Method::Subscribe | Method::Publish | Method::Notify => Policy::AcceptOnly,
            Method::Other(_) => Policy::Unknown,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Handler a request method maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Policy {
    Register,
    Invite,
    Ack,
    Bye,
    NonInvite,
    AcceptOnly,
    Unknown,
}

/// What line 0 of a message says it is
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    Request { method: Method, target: String },
    Response { code: u16 },
}

impl MessageKind {
    /// Classify a message by its first line; `None` if it is neither a
    /// request-line nor a status-line
    pub fn classify(message: &Message) -> Option<Self> {
        match message.parsed_start_line()? {
            StartLine::Request { method, target } => Some(MessageKind::Request {
                method: Method::from_token(method),
                target: target.to_string(),
            }),
            StartLine::Status { code, .. } => Some(MessageKind::Response { code }),
        }
    }
}

/// Why a message was dropped without any answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// First line is neither a request-line nor a status-line
    Malformed,
    /// Well-formed request with a method the proxy does not handle
    UnknownMethod,
    /// Response whose From AOR is not registered
    UnregisteredOrigin,
    /// ACK whose To AOR is not registered
    UnregisteredDestination,
}

/// Outcome of handling one datagram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Rewritten and sent on towards a registered user agent
    Forwarded { destination: SocketAddr },
    /// Answered locally with a synthesized response
    Responded { code: u16 },
    Dropped(DropReason),
    /// Keepalive or empty datagram
    Ignored,
}

/// Stateless router for inbound datagrams
#[derive(Debug)]
pub struct Dispatcher {
    identity: ProxyIdentity,
    registrar: Arc<Registrar>,
    composer: ResponseComposer,
    rewrite_request_uri: bool,
    events: EventSink,
}

impl Dispatcher {
    pub fn new(config: &ProxyConfig, identity: ProxyIdentity, registrar: Arc<Registrar>) -> Self {
        Self {
            identity,
            registrar,
            composer: ResponseComposer::new(config.dialog_tag.clone()),
            rewrite_request_uri: config.rewrite_request_uri,
            events: EventSink::new(),
        }
    }

    /// Also publish every [`ProxyEvent`] on `tx`
    pub fn with_event_channel(mut self, tx: mpsc::UnboundedSender<ProxyEvent>) -> Self {
        self.events = EventSink::with_channel(tx);
        self
    }

    pub fn registrar(&self) -> &Arc<Registrar> {
        &self.registrar
    }

    pub fn identity(&self) -> &ProxyIdentity {
        &self.identity
    }

    /// Handle one datagram received from `source` on `transport`
    pub async fn handle_datagram(
        &self,
        data: &[u8],
        source: SocketAddr,
        transport: Arc<dyn Transport>,
    ) -> Disposition {
        let message = match Message::parse(data) {
            Some(message) => message,
            None => {
                trace!("Ignoring keepalive from {}", source);
                return Disposition::Ignored;
            }
        };

        let kind = match MessageKind::classify(&message) {
            Some(kind) => kind,
            None => {
                if data.len() > MAX_SILENT_GARBAGE_LEN {
                    warn!(
                        "Unrecognized datagram from {} ({} bytes):\n{}",
                        source,
                        data.len(),
                        hex_dump(data)
                    );
                }
                return Disposition::Dropped(DropReason::Malformed);
            }
        };

        debug!("{} from {}", message.start_line(), source);

        let inbound = Inbound {
            message,
            source,
            transport,
        };
        match kind {
            MessageKind::Request { method, .. } => self.handle_request(&method, inbound).await,
            MessageKind::Response { code } => self.handle_response(code, inbound).await,
        }
    }

    async fn handle_request(&self, method: &Method, inbound: Inbound) -> Disposition {
        match method.policy() {
            Policy::Register => self.handle_register(inbound).await,
            Policy::Invite | Policy::NonInvite => self.route_request(method, inbound).await,
            Policy::Ack => self.handle_ack(inbound).await,
            Policy::Bye => {
                let origin = inbound.message.origin().unwrap_or_default();
                let destination = inbound.message.destination().unwrap_or_default();
                let call_id = inbound.message.call_id().unwrap_or_default().to_string();
                let disposition = self.route_request(method, inbound).await;
                self.events.emit(ProxyEvent::CallEnded {
                    call_id,
                    origin,
                    destination,
                });
                disposition
            }
            Policy::AcceptOnly => self.respond(&inbound, StatusReply::OK).await,
            Policy::Unknown => {
                self.events.emit(ProxyEvent::UnknownRequest {
                    line: inbound.message.start_line().to_string(),
                });
                Disposition::Dropped(DropReason::UnknownMethod)
            }
        }
    }

    async fn handle_register(&self, inbound: Inbound) -> Disposition {
        let message = &inbound.message;
        let aor = message.destination().unwrap_or_default();
        let contact_header = message.first_header(HeaderKind::Contact);
        let contact = contact_header
            .and_then(|header| headers::contact_address(header.value))
            .unwrap_or_default()
            .to_string();
        let expires = contact_header
            .and_then(|header| headers::expires_param(header.line))
            .or_else(|| {
                message
                    .first_header(HeaderKind::Expires)
                    .and_then(|header| header.value.trim().parse().ok())
            })
            .map(|seconds| Duration::from_secs(u64::from(seconds)));

        if aor.is_empty() {
            warn!("REGISTER from {} without an address-of-record in To", inbound.source);
        } else {
            let entry = RegistrarEntry::new(contact.clone(), inbound.transport.clone(), inbound.source)
                .with_expires(expires);
            self.registrar.register(aor.clone(), entry);
            self.events.emit(ProxyEvent::Registered { aor, contact });
        }

        self.respond(&inbound, StatusReply::OK).await
    }

    // Invite and non-invite routing: both answer locally when the request
    // cannot be routed, they differ only in the code for an unknown callee
    async fn route_request(&self, method: &Method, inbound: Inbound) -> Disposition {
        let message = &inbound.message;
        let origin = match message.origin() {
            Some(origin) if self.registrar.contains(&origin) => origin,
            _ => return self.respond(&inbound, StatusReply::BAD_REQUEST).await,
        };

        let destination = message.destination();

        if *method == Method::Invite && !message.has_header(HeaderKind::Subject) {
            self.events.emit(ProxyEvent::CallStarted {
                call_id: message.call_id().unwrap_or_default().to_string(),
                origin,
                destination: destination.clone().unwrap_or_default(),
            });
        }

        let destination = match destination {
            Some(destination) if !destination.is_empty() => destination,
            _ => return self.respond(&inbound, StatusReply::SERVER_INTERNAL_ERROR).await,
        };

        match self.registrar.lookup(&destination) {
            Some(entry) => self.forward_request(&inbound, entry).await,
            None if *method == Method::Invite => {
                self.respond(&inbound, StatusReply::TEMPORARILY_UNAVAILABLE).await
            }
            None => self.respond(&inbound, StatusReply::NOT_ACCEPTABLE).await,
        }
    }

    // ACK is never answered, only forwarded when the callee is known
    async fn handle_ack(&self, inbound: Inbound) -> Disposition {
        let entry = inbound
            .message
            .destination()
            .filter(|destination| !destination.is_empty())
            .and_then(|destination| self.registrar.lookup(&destination));

        match entry {
            Some(entry) => self.forward_request(&inbound, entry).await,
            None => {
                debug!("Dropping ACK from {} for an unregistered destination", inbound.source);
                Disposition::Dropped(DropReason::UnregisteredDestination)
            }
        }
    }

    async fn handle_response(&self, code: u16, inbound: Inbound) -> Disposition {
        let message = &inbound.message;
        let origin = match message.origin() {
            Some(origin) if !origin.is_empty() => origin,
            _ => return Disposition::Dropped(DropReason::UnregisteredOrigin),
        };
        let entry = match self.registrar.lookup(&origin) {
            Some(entry) => entry,
            None => {
                debug!("Dropping {} response for unregistered {}", code, origin);
                return Disposition::Dropped(DropReason::UnregisteredOrigin);
            }
        };

        let stripped = transform::strip_route_headers(message);
        let mut response = transform::pop_top_via(&stripped, &self.identity);

        if message.cseq_method() == Some(Method::Invite.as_str()) {
            let call = || {
                (
                    message.call_id().unwrap_or_default().to_string(),
                    origin.clone(),
                    message.destination().unwrap_or_default(),
                )
            };
            match code {
                200 => {
                    let (call_id, origin, destination) = call();
                    self.events.emit(ProxyEvent::CallAccepted {
                        call_id,
                        origin,
                        destination,
                    });
                }
                603 => {
                    let (call_id, origin, destination) = call();
                    self.events.emit(ProxyEvent::CallDeclined {
                        call_id,
                        origin,
                        destination,
                    });
                }
                _ => {}
            }
        }

        if let Some(reason) = relayed_reason(code) {
            response = response.with_start_line(format!("SIP/2.0 {} {}", code, reason));
        }

        self.send(entry.transport.as_ref(), &response, entry.endpoint).await;
        Disposition::Forwarded {
            destination: entry.endpoint,
        }
    }

    async fn forward_request(&self, inbound: &Inbound, entry: RegistrarEntry) -> Disposition {
        let pushed = transform::push_top_via(&inbound.message, &self.identity, inbound.source);
        let stripped = transform::strip_route_headers(&pushed);
        let mut request = transform::insert_record_route(&stripped, &self.identity);
        if self.rewrite_request_uri {
            request = transform::rewrite_request_uri(&request, &self.registrar);
        }

        self.send(entry.transport.as_ref(), &request, entry.endpoint).await;
        Disposition::Forwarded {
            destination: entry.endpoint,
        }
    }

    // Answer goes back through the transport and to the endpoint the request came from
    async fn respond(&self, inbound: &Inbound, status: StatusReply) -> Disposition {
        let response = self.composer.compose(&inbound.message, status, inbound.source);
        self.send(inbound.transport.as_ref(), &response, inbound.source).await;
        Disposition::Responded { code: status.code }
    }

    async fn send(&self, transport: &dyn Transport, message: &Message, destination: SocketAddr) {
        trace!("Sending {} to {}", message.start_line(), destination);
        if let Err(e) = transport.send_datagram(message.to_bytes(), destination).await {
            warn!("Failed to send {} to {}: {}", message.start_line(), destination, e);
        }
    }
}

// A parsed datagram together with where it came from
struct Inbound {
    message: Message,
    source: SocketAddr,
    transport: Arc<dyn Transport>,
}
