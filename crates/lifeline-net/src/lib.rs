// Peer group layer: lifecycle management over a radio-level transport,
// the newline-delimited TCP wire, and a LAN-backed transport.

pub mod discovery;
pub mod group;
pub mod lan;
pub mod messages;
#[cfg(any(test, feature = "sim"))]
pub mod sim;
pub mod transport;
pub mod wire;

pub use discovery::load_static_peers;
pub use group::{PeerGroupManager, SendReport};
pub use lan::{LanRole, LanTransport};
pub use messages::PeerEvent;
pub use transport::{PeerTransport, TransportEvent};
