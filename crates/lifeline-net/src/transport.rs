//! Radio-level peer transport capability.
//!
//! The peer group manager drives everything through this trait; the
//! underlying radio or driver is never touched directly.

use std::net::IpAddr;

use async_trait::async_trait;
use tokio::sync::mpsc;

use lifeline_shared::error::TransportError;
use lifeline_shared::types::{DiscoveredPeer, PeerConnectionInfo};

/// Events pushed by the transport outside of any request.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// One raw line received on the peer port, undecoded.
    MessageReceived(String),
    /// A line that could not be read as text.
    Malformed(String),
    /// The group formed and the owner's address became known.
    GroupOwnerAddress(IpAddr),
    /// The discovered peer set changed.
    PeersChanged(Vec<DiscoveredPeer>),
}

#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn is_radio_enabled(&self) -> bool;

    /// Host a group with this device as owner.
    async fn create_group(&self) -> Result<(), TransportError>;

    /// Dissolve whatever group this device hosts or belongs to.
    async fn remove_group(&self) -> Result<(), TransportError>;

    /// Start a discovery round. Results arrive asynchronously and are read
    /// with [`available_peers`](Self::available_peers).
    async fn discover_peers(&self) -> Result<(), TransportError>;

    async fn available_peers(&self) -> Vec<DiscoveredPeer>;

    async fn connect(&self, device_address: &str) -> Result<(), TransportError>;

    async fn connection_info(&self) -> Result<PeerConnectionInfo, TransportError>;

    /// Deliver one payload line to `host:port`.
    async fn send(&self, host: IpAddr, port: u16, payload: &str) -> Result<(), TransportError>;

    /// Take the event stream. Only the first caller receives it.
    fn subscribe(&self) -> Option<mpsc::Receiver<TransportEvent>>;
}
