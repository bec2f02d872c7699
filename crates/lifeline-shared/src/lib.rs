//! Shared domain types, wire envelope, error taxonomy and capability traits.

pub mod capabilities;
pub mod config;
pub mod constants;
pub mod error;
pub mod protocol;
pub mod types;

pub use capabilities::{
    Alert, AlertAction, AlertSeverity, AlertSink, AllowAll, LocationProvider, NetworkReachability,
    PermissionGate, PermissionScope, PersistentCache,
};
pub use config::Tunables;
pub use error::{ErrorKind, FailureReason};
pub use types::{
    Coordinates, DiscoveredPeer, EmergencyRecord, PeerConnectionInfo, PeerGroupState,
    RecordKind, SendOutcome, SosMessage, Urgency,
};
