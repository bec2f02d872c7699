use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error taxonomy shared by every component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    PermissionDenied,
    RadioDisabled,
    LocationUnavailable,
    NetworkTransportError,
    PeerDiscoveryEmpty,
    PeerConnectionError,
    GroupCreationError,
    MalformedInboundMessage,
    UpstreamSourceError,
    CacheCorruption,
    InvalidMessage,
}

impl ErrorKind {
    /// Whether a retry from the UI has a reasonable chance of succeeding.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::PermissionDenied | Self::InvalidMessage)
    }
}

/// Reason attached to a failed [`SendOutcome`](crate::types::SendOutcome).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{kind:?}: {message}")]
pub struct FailureReason {
    pub kind: ErrorKind,
    pub message: String,
}

impl FailureReason {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Radio/driver level failure reported by a `PeerTransport`.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Radio rejected the request (reason code {0})")]
    Rejected(i32),

    #[error("Transport unavailable: {0}")]
    Unavailable(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum GroupError {
    #[error("Radio is disabled")]
    RadioDisabled,

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Group creation failed: {0}")]
    Creation(#[source] TransportError),

    #[error("Group creation failed after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("Peer group state changed while the group was being created")]
    Interrupted,

    #[error("Peer group manager has been torn down")]
    TornDown,
}

impl GroupError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RadioDisabled => ErrorKind::RadioDisabled,
            Self::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Self::Creation(_)
            | Self::RetriesExhausted { .. }
            | Self::Interrupted
            | Self::TornDown => {
                ErrorKind::GroupCreationError
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("No peers found. Make sure the other device is discoverable")]
    NoPeersFound,

    #[error("Peer discovery failed: {0}")]
    Discovery(#[source] TransportError),

    #[error("Could not connect to peer {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: TransportError,
    },

    #[error("Group not formed after connecting")]
    GroupNotFormed,
}

impl DiscoveryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoPeersFound => ErrorKind::PeerDiscoveryEmpty,
            Self::Discovery(_) | Self::Connect { .. } | Self::GroupNotFormed => {
                ErrorKind::PeerConnectionError
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum PeerSendError {
    #[error("This device is the group owner and only receives messages")]
    GroupOwner,

    #[error("Peer group is not active")]
    GroupNotActive,

    #[error("Group owner address unknown")]
    NoGroupOwnerAddress,

    #[error("Send failed after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}

impl PeerSendError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::PeerConnectionError
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LocationError {
    #[error("Location permission denied")]
    PermissionDenied,

    #[error("Location unavailable: {0}")]
    Unavailable(String),

    #[error("Location request timed out after {0:?}")]
    Timeout(Duration),
}

impl LocationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PermissionDenied => ErrorKind::PermissionDenied,
            Self::Unavailable(_) | Self::Timeout(_) => ErrorKind::LocationUnavailable,
        }
    }
}

/// Failure of the networked SOS path (submission or notification).
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("{endpoint} returned HTTP {status}")]
    Status { endpoint: &'static str, status: u16 },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("SOS has no coordinates to report")]
    MissingCoordinates,
}

impl DeliveryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingCoordinates => ErrorKind::LocationUnavailable,
            Self::Status { .. } | Self::Transport(_) => ErrorKind::NetworkTransportError,
        }
    }
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache backend error: {0}")]
    Backend(String),

    #[error("Cached value is corrupt: {0}")]
    Corrupt(String),
}

/// A wire envelope that could not be decoded.
#[derive(Error, Debug)]
pub enum EnvelopeError {
    #[error("Envelope is {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },

    #[error("Malformed envelope: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Envelope has no message text")]
    EmptyMessage,
}

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("HTTP {0}")]
    Status(u16),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Unexpected response shape: {0}")]
    Decode(String),

    #[error("No usable data: {0}")]
    Empty(String),

    #[error("Timeout")]
    Timeout,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_error_kinds() {
        assert_eq!(GroupError::RadioDisabled.kind(), ErrorKind::RadioDisabled);
        assert_eq!(
            GroupError::RetriesExhausted { attempts: 3 }.kind(),
            ErrorKind::GroupCreationError
        );
        assert_eq!(
            GroupError::PermissionDenied("nearby devices".into()).kind(),
            ErrorKind::PermissionDenied
        );
        assert_eq!(GroupError::Interrupted.kind(), ErrorKind::GroupCreationError);
    }

    #[test]
    fn test_discovery_error_kinds() {
        assert_eq!(DiscoveryError::NoPeersFound.kind(), ErrorKind::PeerDiscoveryEmpty);
        assert_eq!(
            DiscoveryError::Discovery(TransportError::Rejected(2)).kind(),
            ErrorKind::PeerConnectionError
        );
    }

    #[test]
    fn test_failure_reason_serializes_snake_case() {
        let reason = FailureReason::new(ErrorKind::RadioDisabled, "Wi-Fi is off");
        let json = serde_json::to_value(&reason).unwrap();
        assert_eq!(json["kind"], "radio_disabled");
        assert_eq!(json["message"], "Wi-Fi is off");
    }
}
