//! Receive loop: one task per inbound datagram

use std::sync::Arc;

use anyhow::Result;
use sipline_core::{Dispatcher, ProxyConfig, ProxyIdentity, Registrar};
use sipline_transport::{Transport, TransportEvent, UdpTransport};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// A bound proxy, ready to serve
pub struct Server {
    dispatcher: Arc<Dispatcher>,
    transport: Arc<dyn Transport>,
    events: mpsc::Receiver<TransportEvent>,
}

impl Server {
    /// Bind the UDP transport and build the dispatcher with an empty registrar
    pub async fn bind(config: &ProxyConfig, identity: ProxyIdentity) -> Result<Self> {
        let registrar = Arc::new(Registrar::new(config.expiry_policy()));
        let dispatcher = Arc::new(Dispatcher::new(config, identity, registrar));
        let (transport, events) = UdpTransport::bind(config.listen_addr(), Some(config.channel_capacity)).await?;

        Ok(Self {
            dispatcher,
            transport: Arc::new(transport),
            events,
        })
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        self.transport.clone()
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        self.dispatcher.clone()
    }

    /// Serve until the transport closes
    pub async fn run(mut self) {
        info!(
            "Proxy {} serving on {:?}",
            self.dispatcher.identity().address(),
            self.transport.local_addr()
        );

        while let Some(event) = self.events.recv().await {
            match event {
                TransportEvent::DatagramReceived { data, source, .. } => {
                    let dispatcher = self.dispatcher.clone();
                    let transport = self.transport.clone();
                    tokio::spawn(async move {
                        let disposition = dispatcher.handle_datagram(&data, source, transport).await;
                        debug!("{} -> {:?}", source, disposition);
                    });
                }
                TransportEvent::Error { error } => warn!("Transport error: {}", error),
                TransportEvent::Closed => break,
            }
        }

        info!("Transport closed");
    }
}
