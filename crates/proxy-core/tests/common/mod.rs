//! Shared helpers for the dispatcher integration tests
//!
//! A [`RecordingTransport`] stands in for the UDP socket: every datagram the
//! proxy sends is kept so tests can assert on where it went and what it said.

#![allow(dead_code)]

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use sipline_core::{Dispatcher, Message, ProxyConfig, ProxyEvent, ProxyIdentity, Registrar};
use sipline_transport::{Result, Transport};
use tokio::sync::mpsc;
use tracing::subscriber::DefaultGuard;

pub const PROXY_ADDR: &str = "192.0.2.10:5060";
pub const ALICE_ADDR: &str = "203.0.113.7:40000";
pub const BOB_ADDR: &str = "198.51.100.20:5062";
pub const CAROL_ADDR: &str = "198.51.100.30:5064";

/// Transport that records outbound datagrams instead of sending them
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(SocketAddr, Bytes)>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Everything sent so far, in order
    pub fn sent(&self) -> Vec<(SocketAddr, Bytes)> {
        self.sent.lock().unwrap().clone()
    }

    /// Sent datagrams parsed back into messages
    pub fn sent_messages(&self) -> Vec<(SocketAddr, Message)> {
        self.sent()
            .into_iter()
            .map(|(addr, data)| (addr, Message::parse(&data).unwrap()))
            .collect()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(PROXY_ADDR.parse().unwrap())
    }

    async fn send_datagram(&self, data: Bytes, destination: SocketAddr) -> Result<()> {
        self.sent.lock().unwrap().push((destination, data));
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    fn is_closed(&self) -> bool {
        false
    }
}

/// Log output of the current thread, kept in memory
#[derive(Debug, Clone, Default)]
pub struct CapturedLogs {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl CapturedLogs {
    /// Route this thread's tracing output into the buffer until the guard drops
    pub fn install(&self) -> DefaultGuard {
        let writer = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock().unwrap()).into_owned()
    }

    pub fn clear(&self) {
        self.buffer.lock().unwrap().clear();
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A dispatcher wired to a fresh registrar, with its event channel
pub struct Harness {
    pub dispatcher: Dispatcher,
    pub transport: Arc<RecordingTransport>,
    pub events: mpsc::UnboundedReceiver<ProxyEvent>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(ProxyConfig::default())
    }

    pub fn with_config(config: ProxyConfig) -> Self {
        let proxy: SocketAddr = PROXY_ADDR.parse().unwrap();
        let identity = ProxyIdentity::new(proxy.ip(), proxy.port(), &config.branch_suffix);
        let registrar = Arc::new(Registrar::new(config.expiry_policy()));
        let (tx, events) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new(&config, identity, registrar).with_event_channel(tx);
        Self {
            dispatcher,
            transport: RecordingTransport::new(),
            events,
        }
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        self.transport.clone()
    }

    /// Feed `text` to the dispatcher as if it arrived from `source`
    pub async fn receive(&self, text: &str, source: &str) -> sipline_core::Disposition {
        self.dispatcher
            .handle_datagram(text.as_bytes(), source.parse().unwrap(), self.transport())
            .await
    }

    /// Register `user@host` from `source` and forget the 200 and the event
    pub async fn register(&mut self, aor: &str, source: &str) {
        self.receive(&register(aor, source), source).await;
        self.transport.clear();
        while self.events.try_recv().is_ok() {}
    }

    pub fn drain_events(&mut self) -> Vec<ProxyEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

/// REGISTER binding `aor` to the contact `host:port` of `source`
pub fn register(aor: &str, source: &str) -> String {
    [
        format!("REGISTER sip:{} SIP/2.0", aor.split('@').nth(1).unwrap_or_default()),
        format!("Via: SIP/2.0/UDP {};branch=z9hG4bKreg{};rport", source, source.len()),
        format!("To: <sip:{}>", aor),
        format!("From: <sip:{}>;tag=reg1", aor),
        "Call-ID: reg-call-id".to_string(),
        "CSeq: 1 REGISTER".to_string(),
        format!("Contact: <sip:{}>", source),
        "Content-Length: 0".to_string(),
        String::new(),
        String::new(),
    ]
    .join("\r\n")
}

/// Request `method` from `from` to `to`, routed through the proxy
pub fn request(method: &str, from: &str, to: &str) -> String {
    [
        format!("{} sip:{} SIP/2.0", method, to),
        "Via: SIP/2.0/UDP 10.0.0.5:5060;branch=z9hG4bK776asdhds;rport".to_string(),
        "Max-Forwards: 70".to_string(),
        format!("Route: <sip:{};lr>", PROXY_ADDR),
        format!("To: <sip:{}>", to),
        format!("From: <sip:{}>;tag=1928301774", from),
        "Call-ID: a84b4c76e66710".to_string(),
        format!("CSeq: 314159 {}", method),
        "Content-Length: 0".to_string(),
        String::new(),
        String::new(),
    ]
    .join("\r\n")
}

/// Response travelling back from the callee `to` to the caller `from`
pub fn response(status: &str, cseq_method: &str, from: &str, to: &str) -> String {
    [
        format!("SIP/2.0 {}", status),
        format!("Via: SIP/2.0/UDP {};branch=z9hG4bK776asdhdsm", PROXY_ADDR),
        "Via: SIP/2.0/UDP 10.0.0.5:5060;branch=z9hG4bK776asdhds;received=203.0.113.7;rport=40000"
            .to_string(),
        format!("Record-Route: <sip:{};lr>", PROXY_ADDR),
        format!("Route: <sip:{};lr>", PROXY_ADDR),
        format!("To: <sip:{}>;tag=a6c85cf", to),
        format!("From: <sip:{}>;tag=1928301774", from),
        "Call-ID: a84b4c76e66710".to_string(),
        format!("CSeq: 314159 {}", cseq_method),
        "Content-Length: 0".to_string(),
        String::new(),
        String::new(),
    ]
    .join("\r\n")
}
