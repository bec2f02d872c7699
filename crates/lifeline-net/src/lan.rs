//! Peer transport over an existing local network.
//!
//! Stands in for a radio-level ad-hoc group on hosts where the LAN (or a
//! hotspot) already links the devices. A host node "creates the group" by
//! listening on the peer port; a client node discovers hosts from a static
//! list and sends to the first one.

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use lifeline_shared::error::TransportError;
use lifeline_shared::types::{DiscoveredPeer, PeerConnectionInfo};

use crate::discovery::load_static_peers;
use crate::transport::{PeerTransport, TransportEvent};
use crate::wire;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanRole {
    /// Receives SOS envelopes; acts as group owner.
    Host,
    /// Originates SOS envelopes towards a host.
    Client,
}

pub struct LanTransport {
    role: LanRole,
    peers_path: Option<PathBuf>,
    bind_addr: IpAddr,
    port: u16,
    connect_timeout: Duration,
    events_tx: mpsc::Sender<TransportEvent>,
    events_rx: Mutex<Option<mpsc::Receiver<TransportEvent>>>,
    listener: Mutex<Option<JoinHandle<()>>>,
    discovered: RwLock<Vec<DiscoveredPeer>>,
    connected: RwLock<Option<IpAddr>>,
}

impl LanTransport {
    pub fn new(
        role: LanRole,
        peers_path: Option<PathBuf>,
        port: u16,
        connect_timeout: Duration,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(256);
        Self {
            role,
            peers_path,
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port,
            connect_timeout,
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            listener: Mutex::new(None),
            discovered: RwLock::new(Vec::new()),
            connected: RwLock::new(None),
        }
    }

    /// Listen on a specific address instead of all interfaces.
    pub fn with_bind_addr(mut self, addr: IpAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    pub fn role(&self) -> LanRole {
        self.role
    }

    fn is_listening(&self) -> bool {
        self.listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}

#[async_trait]
impl PeerTransport for LanTransport {
    async fn is_radio_enabled(&self) -> bool {
        true
    }

    async fn create_group(&self) -> Result<(), TransportError> {
        if self.role == LanRole::Client {
            debug!("Client role, group is the shared LAN");
            return Ok(());
        }
        if self.is_listening() {
            return Ok(());
        }

        let listener = TcpListener::bind((self.bind_addr, self.port)).await?;
        let handle =
            wire::spawn_line_listener(listener, self.events_tx.clone(), self.connect_timeout);
        *self.listener.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);

        info!(addr = %self.bind_addr, port = self.port, "Hosting peer group");
        Ok(())
    }

    async fn remove_group(&self) -> Result<(), TransportError> {
        if let Some(handle) = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
            info!("Peer listener stopped");
        }
        *self.connected.write().await = None;
        Ok(())
    }

    async fn discover_peers(&self) -> Result<(), TransportError> {
        let Some(path) = &self.peers_path else {
            return Err(TransportError::Unavailable(
                "no peer list configured".to_string(),
            ));
        };

        let peers = load_static_peers(path);
        *self.discovered.write().await = peers.clone();
        let _ = self.events_tx.try_send(TransportEvent::PeersChanged(peers));
        Ok(())
    }

    async fn available_peers(&self) -> Vec<DiscoveredPeer> {
        self.discovered.read().await.clone()
    }

    async fn connect(&self, device_address: &str) -> Result<(), TransportError> {
        let ip: IpAddr = device_address.parse().map_err(|_| {
            TransportError::Unavailable(format!("not an IP address: {device_address}"))
        })?;

        *self.connected.write().await = Some(ip);
        let _ = self
            .events_tx
            .try_send(TransportEvent::GroupOwnerAddress(ip));
        debug!(owner = %ip, "Joined peer group");
        Ok(())
    }

    async fn connection_info(&self) -> Result<PeerConnectionInfo, TransportError> {
        Ok(match self.role {
            LanRole::Host => PeerConnectionInfo {
                group_formed: self.is_listening(),
                is_group_owner: true,
                group_owner_address: None,
            },
            LanRole::Client => {
                let owner = *self.connected.read().await;
                PeerConnectionInfo {
                    group_formed: owner.is_some(),
                    is_group_owner: false,
                    group_owner_address: owner,
                }
            }
        })
    }

    async fn send(&self, host: IpAddr, port: u16, payload: &str) -> Result<(), TransportError> {
        wire::send_line(host, port, payload, self.connect_timeout).await
    }

    fn subscribe(&self) -> Option<mpsc::Receiver<TransportEvent>> {
        self.events_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl Drop for LanTransport {
    fn drop(&mut self) {
        if let Some(handle) = self
            .listener
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}
