//! sipline: stateless SIP proxy and registrar over UDP

mod address;
mod cli;
mod logging;
mod server;

use anyhow::Result;
use clap::Parser;
use sipline_core::ProxyIdentity;
use tracing::{info, warn};

use crate::cli::Args;
use crate::server::Server;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let settings = args.settings()?;
    logging::setup_logging(&settings.logging)?;

    info!("Starting sipline v{}", env!("CARGO_PKG_VERSION"));

    let config = settings.proxy;
    let advertised =
        address::resolve_advertised_address(config.advertised_address, settings.fallback_address).await?;
    let identity = ProxyIdentity::new(advertised, config.port, &config.branch_suffix);
    info!("{}", identity.via());
    info!("{}", identity.record_route());

    let server = Server::bind(&config, identity).await?;
    let transport = server.transport();
    let dispatcher = server.dispatcher();
    let serving = tokio::spawn(server.run());

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    transport.close().await?;
    if let Err(e) = serving.await {
        warn!("Receive loop ended abnormally: {}", e);
    }
    info!("Dropped {} registrations", dispatcher.registrar().len());

    Ok(())
}
