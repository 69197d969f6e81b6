//! Proxy configuration and the proxy's advertised identity

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::registrar::ExpiryPolicy;

/// Default SIP port
pub const DEFAULT_SIP_PORT: u16 = 5060;

/// Dialog tag added to the To header of locally synthesized responses
pub const DEFAULT_DIALOG_TAG: &str = "123456";

/// Suffix appended to a request's branch to form the branch of the pushed Via
pub const DEFAULT_BRANCH_SUFFIX: &str = "m";

/// Main proxy configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Interface to listen on
    pub bind_address: IpAddr,
    /// UDP port to listen on, also advertised in Via and Record-Route
    pub port: u16,
    /// Address advertised in Via and Record-Route; resolved from the hostname when unset
    pub advertised_address: Option<IpAddr>,
    /// Capacity of the transport event channel
    pub channel_capacity: usize,
    /// Whether registrar entries expire according to the REGISTER's Expires value
    pub honor_expires: bool,
    /// Whether forwarded requests get their request-URI replaced by the registered contact
    pub rewrite_request_uri: bool,
    /// Tag appended to To headers lacking one in synthesized responses
    pub dialog_tag: String,
    /// Suffix appended to the original branch when pushing the proxy's Via
    pub branch_suffix: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_SIP_PORT,
            advertised_address: None,
            channel_capacity: 100,
            honor_expires: false,
            rewrite_request_uri: false,
            dialog_tag: DEFAULT_DIALOG_TAG.to_string(),
            branch_suffix: DEFAULT_BRANCH_SUFFIX.to_string(),
        }
    }
}

impl ProxyConfig {
    /// Address the transport binds to
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    /// Registrar expiry policy selected by this configuration
    pub fn expiry_policy(&self) -> ExpiryPolicy {
        if self.honor_expires {
            ExpiryPolicy::HonorExpires
        } else {
            ExpiryPolicy::Never
        }
    }

    /// Check the configuration for values the proxy cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(Error::Config("port must be non-zero".to_string()));
        }
        if self.channel_capacity == 0 {
            return Err(Error::Config("channel_capacity must be non-zero".to_string()));
        }
        if self.dialog_tag.is_empty() || self.dialog_tag.contains(char::is_whitespace) {
            return Err(Error::Config(format!(
                "dialog_tag must be a non-empty token, got {:?}",
                self.dialog_tag
            )));
        }
        if self.branch_suffix.is_empty() || self.branch_suffix.contains([';', ',', ' ']) {
            return Err(Error::Config(format!(
                "branch_suffix must be a non-empty token, got {:?}",
                self.branch_suffix
            )));
        }
        if let Some(addr) = self.advertised_address {
            if addr.is_unspecified() {
                return Err(Error::InvalidAddress(format!(
                    "advertised address {} is unspecified",
                    addr
                )));
            }
        }
        Ok(())
    }
}

/// The Via and Record-Route values this proxy advertises.
///
/// Computed once at startup and never changed afterwards: the same Via marker
/// is pushed on forwarded requests and recognized (then popped) on the
/// responses coming back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyIdentity {
    address: SocketAddr,
    via: String,
    record_route: String,
    branch_suffix: String,
}

impl ProxyIdentity {
    /// Build the markers for `address:port`
    pub fn new(address: IpAddr, port: u16, branch_suffix: impl Into<String>) -> Self {
        let address = SocketAddr::new(address, port);
        Self {
            address,
            via: format!("Via: SIP/2.0/UDP {}", address),
            record_route: format!("Record-Route: <sip:{};lr>", address),
            branch_suffix: branch_suffix.into(),
        }
    }

    /// Advertised address and port
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// `Via: SIP/2.0/UDP <ip>:<port>`
    pub fn via(&self) -> &str {
        &self.via
    }

    /// `Record-Route: <sip:<ip>:<port>;lr>`
    pub fn record_route(&self) -> &str {
        &self.record_route
    }

    pub fn branch_suffix(&self) -> &str {
        &self.branch_suffix
    }

    /// The Via line pushed in front of a Via carrying `branch`
    pub fn via_with_branch(&self, branch: &str) -> String {
        format!("{};branch={}{}", self.via, branch, self.branch_suffix)
    }

    /// Whether `line` is a Via this proxy pushed earlier
    pub fn is_own_via(&self, line: &str) -> bool {
        match line.strip_prefix(self.via.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with(';') || rest.starts_with(' '),
            None => false,
        }
    }
}
