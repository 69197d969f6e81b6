//! In-memory registrar
//!
//! Maps an address-of-record (`user@host`, exactly as extracted from the To
//! header of a REGISTER) to the place the user agent was last seen: its
//! Contact address, the transport the REGISTER arrived on and the remote
//! endpoint it came from.
//!
//! One binding per AOR. A new REGISTER replaces the previous binding as a
//! whole (last write wins); there is no removal operation.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use sipline_transport::Transport;

/// Whether bindings lapse after the lifetime the user agent asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpiryPolicy {
    /// Bindings live for the lifetime of the process
    #[default]
    Never,
    /// Bindings are ignored once their Expires value has elapsed
    HonorExpires,
}

/// Where an AOR can currently be reached
#[derive(Clone)]
pub struct RegistrarEntry {
    /// Contact address from the REGISTER (`host[:port]`)
    pub contact: String,
    /// Transport the REGISTER arrived on; forwarded traffic leaves through it
    pub transport: Arc<dyn Transport>,
    /// Source address of the REGISTER
    pub endpoint: SocketAddr,
    pub registered_at: Instant,
    /// Lifetime requested by the user agent, if any
    pub expires: Option<Duration>,
}

impl RegistrarEntry {
    pub fn new(contact: impl Into<String>, transport: Arc<dyn Transport>, endpoint: SocketAddr) -> Self {
        Self {
            contact: contact.into(),
            transport,
            endpoint,
            registered_at: Instant::now(),
            expires: None,
        }
    }

    pub fn with_expires(mut self, expires: Option<Duration>) -> Self {
        self.expires = expires;
        self
    }

    /// Whether the requested lifetime has elapsed at `now`
    pub fn is_expired_at(&self, now: Instant) -> bool {
        match self.expires {
            Some(lifetime) => now.saturating_duration_since(self.registered_at) >= lifetime,
            None => false,
        }
    }
}

impl fmt::Debug for RegistrarEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrarEntry")
            .field("contact", &self.contact)
            .field("transport", &self.transport)
            .field("endpoint", &self.endpoint)
            .field("expires", &self.expires)
            .finish()
    }
}

/// AOR -> binding map shared by every message handler
#[derive(Debug, Default)]
pub struct Registrar {
    entries: DashMap<String, RegistrarEntry>,
    policy: ExpiryPolicy,
}

impl Registrar {
    pub fn new(policy: ExpiryPolicy) -> Self {
        Self {
            entries: DashMap::new(),
            policy,
        }
    }

    pub fn policy(&self) -> ExpiryPolicy {
        self.policy
    }

    /// Insert or replace the binding for `aor`, returning the one it replaced
    pub fn register(&self, aor: impl Into<String>, entry: RegistrarEntry) -> Option<RegistrarEntry> {
        self.entries.insert(aor.into(), entry)
    }

    /// Current binding for `aor`
    pub fn lookup(&self, aor: &str) -> Option<RegistrarEntry> {
        let entry = self.entries.get(aor)?;
        if self.policy == ExpiryPolicy::HonorExpires && entry.is_expired_at(Instant::now()) {
            return None;
        }
        Some(entry.value().clone())
    }

    pub fn contains(&self, aor: &str) -> bool {
        self.lookup(aor).is_some()
    }

    /// Number of stored bindings, expired ones included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered AORs, in no particular order
    pub fn aors(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;

    #[derive(Debug)]
    struct NullTransport;

    #[async_trait]
    impl Transport for NullTransport {
        fn local_addr(&self) -> sipline_transport::Result<SocketAddr> {
            Ok("127.0.0.1:5060".parse().unwrap())
        }

        async fn send_datagram(&self, _data: Bytes, _destination: SocketAddr) -> sipline_transport::Result<()> {
            Ok(())
        }

        async fn close(&self) -> sipline_transport::Result<()> {
            Ok(())
        }

        fn is_closed(&self) -> bool {
            false
        }
    }

    fn entry(contact: &str, endpoint: &str) -> RegistrarEntry {
        RegistrarEntry::new(contact, Arc::new(NullTransport), endpoint.parse().unwrap())
    }

    #[test]
    fn test_register_and_lookup() {
        let registrar = Registrar::default();
        assert!(registrar.is_empty());
        assert!(registrar.lookup("alice@atlanta.com").is_none());

        registrar.register("alice@atlanta.com", entry("10.0.0.5:5062", "203.0.113.7:40000"));

        let found = registrar.lookup("alice@atlanta.com").unwrap();
        assert_eq!(found.contact, "10.0.0.5:5062");
        assert_eq!(found.endpoint, "203.0.113.7:40000".parse().unwrap());
        assert_eq!(registrar.len(), 1);
        assert_eq!(registrar.aors(), vec!["alice@atlanta.com".to_string()]);
    }

    #[test]
    fn test_reregister_overwrites() {
        let registrar = Registrar::default();
        registrar.register("alice@atlanta.com", entry("10.0.0.5:5062", "203.0.113.7:40000"));
        let previous = registrar.register("alice@atlanta.com", entry("10.0.0.9:5064", "203.0.113.8:41000"));

        assert_eq!(previous.unwrap().contact, "10.0.0.5:5062");
        let found = registrar.lookup("alice@atlanta.com").unwrap();
        assert_eq!(found.contact, "10.0.0.9:5064");
        assert_eq!(found.endpoint, "203.0.113.8:41000".parse().unwrap());
        assert_eq!(registrar.len(), 1);
    }

    #[test]
    fn test_aor_is_not_normalized() {
        let registrar = Registrar::default();
        registrar.register("Alice@Atlanta.com", entry("10.0.0.5", "203.0.113.7:40000"));
        assert!(registrar.contains("Alice@Atlanta.com"));
        assert!(!registrar.contains("alice@atlanta.com"));
    }

    #[test]
    fn test_expired_entries_kept_under_never_policy() {
        let registrar = Registrar::new(ExpiryPolicy::Never);
        registrar.register(
            "alice@atlanta.com",
            entry("10.0.0.5", "203.0.113.7:40000").with_expires(Some(Duration::ZERO)),
        );
        assert!(registrar.contains("alice@atlanta.com"));
    }

    #[test]
    fn test_expired_entries_hidden_when_honoring_expires() {
        let registrar = Registrar::new(ExpiryPolicy::HonorExpires);
        registrar.register(
            "alice@atlanta.com",
            entry("10.0.0.5", "203.0.113.7:40000").with_expires(Some(Duration::ZERO)),
        );
        registrar.register(
            "bob@biloxi.com",
            entry("10.0.0.6", "203.0.113.9:40000").with_expires(Some(Duration::from_secs(3600))),
        );
        registrar.register("carol@chicago.com", entry("10.0.0.7", "203.0.113.10:40000"));

        assert!(!registrar.contains("alice@atlanta.com"));
        assert!(registrar.contains("bob@biloxi.com"));
        assert!(registrar.contains("carol@chicago.com"));
        assert_eq!(registrar.len(), 3);
    }

    #[test]
    fn test_concurrent_registers_leave_one_entry() {
        let registrar = Arc::new(Registrar::default());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registrar = registrar.clone();
                std::thread::spawn(move || {
                    registrar.register("alice@atlanta.com", entry(&format!("10.0.0.{}", i), "203.0.113.7:40000"));
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registrar.len(), 1);
        assert!(registrar.lookup("alice@atlanta.com").unwrap().contact.starts_with("10.0.0."));
    }
}
