//! Choosing the address advertised in Via and Record-Route

use std::net::IpAddr;

use anyhow::{bail, Context, Result};
use tracing::{debug, info};

/// Address the proxy advertises.
///
/// An address set in the configuration is used as is. Otherwise the local
/// hostname is resolved; if it only maps to loopback, `fallback` must be given.
pub async fn resolve_advertised_address(configured: Option<IpAddr>, fallback: Option<IpAddr>) -> Result<IpAddr> {
    if let Some(address) = configured {
        return Ok(address);
    }

    let host = hostname::get().context("failed to read the local hostname")?;
    let host = host.to_string_lossy().into_owned();
    let candidates: Vec<IpAddr> = match tokio::net::lookup_host((host.as_str(), 0)).await {
        Ok(addrs) => addrs.map(|addr| addr.ip()).collect(),
        Err(e) => {
            debug!("Could not resolve {}: {}", host, e);
            Vec::new()
        }
    };
    debug!("{} resolves to {:?}", host, candidates);

    match select_address(&candidates, fallback) {
        Some(address) => {
            info!("Advertising {}", address);
            Ok(address)
        }
        None => bail!(
            "hostname {} does not resolve to a routable address; pass the address to advertise as an argument",
            host
        ),
    }
}

/// Pick the address to advertise from what the hostname resolved to.
///
/// Non-loopback IPv4 is preferred, then any other non-loopback address,
/// then `fallback`.
pub fn select_address(candidates: &[IpAddr], fallback: Option<IpAddr>) -> Option<IpAddr> {
    let routable = |addr: &&IpAddr| !addr.is_loopback() && !addr.is_unspecified();
    candidates
        .iter()
        .filter(routable)
        .find(|addr| addr.is_ipv4())
        .or_else(|| candidates.iter().find(routable))
        .copied()
        .or(fallback)
}
