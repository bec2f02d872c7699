//! Inbound peer event decoding.

use std::net::IpAddr;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use lifeline_shared::error::ErrorKind;
use lifeline_shared::protocol::{ReceivedSos, SosEnvelope};
use lifeline_shared::types::DiscoveredPeer;

use crate::transport::TransportEvent;

/// Capacity of the channel handed to the application.
pub const PEER_EVENT_CAPACITY: usize = 256;

/// Typed events dispatched by the peer group manager.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerEvent {
    MessageReceived(ReceivedSos),
    GroupOwnerIpReceived(IpAddr),
    PeersChanged(Vec<DiscoveredPeer>),
    /// A line that failed to decode. It is dropped; the stream continues.
    Malformed { error: String },
}

impl PeerEvent {
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Malformed { .. } => Some(ErrorKind::MalformedInboundMessage),
            _ => None,
        }
    }
}

/// Decode transport events into [`PeerEvent`]s until either side closes.
pub async fn pump_inbound(
    mut events: mpsc::Receiver<TransportEvent>,
    out: mpsc::Sender<PeerEvent>,
) {
    while let Some(event) = events.recv().await {
        let event = match event {
            TransportEvent::MessageReceived(raw) => match SosEnvelope::decode(&raw) {
                Ok(sos) => {
                    info!(
                        len = raw.len(),
                        has_location = sos.coordinates.is_some(),
                        "SOS received from peer"
                    );
                    PeerEvent::MessageReceived(sos)
                }
                Err(e) => {
                    warn!(len = raw.len(), error = %e, "Dropping malformed inbound envelope");
                    PeerEvent::Malformed {
                        error: e.to_string(),
                    }
                }
            },
            TransportEvent::Malformed(reason) => {
                warn!(error = %reason, "Dropping unreadable inbound line");
                PeerEvent::Malformed { error: reason }
            }
            TransportEvent::GroupOwnerAddress(ip) => {
                debug!(owner = %ip, "Group owner address received");
                PeerEvent::GroupOwnerIpReceived(ip)
            }
            TransportEvent::PeersChanged(peers) => PeerEvent::PeersChanged(peers),
        };

        if out.send(event).await.is_err() {
            debug!("Peer event receiver dropped, stopping inbound pump");
            return;
        }
    }

    debug!("Transport event stream ended");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_malformed_lines_do_not_stop_the_stream() {
        let (tx, rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let pump = tokio::spawn(pump_inbound(rx, out_tx));

        tx.send(TransportEvent::MessageReceived("{not json".into()))
            .await
            .unwrap();
        tx.send(TransportEvent::MessageReceived(
            r#"{"message":"HELP ME!","coordinates":{"coordinates":[96.1951,16.8661]},"timestamp":"2025-03-28T06:30:00.000Z"}"#.into(),
        ))
        .await
        .unwrap();
        drop(tx);

        let first = out_rx.recv().await.unwrap();
        assert_eq!(first.error_kind(), Some(ErrorKind::MalformedInboundMessage));

        match out_rx.recv().await.unwrap() {
            PeerEvent::MessageReceived(sos) => assert_eq!(sos.message, "HELP ME!"),
            other => panic!("unexpected event: {other:?}"),
        }

        assert!(out_rx.recv().await.is_none());
        pump.await.unwrap();
    }

    #[tokio::test]
    async fn test_unreadable_line_is_malformed() {
        let (tx, rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let pump = tokio::spawn(pump_inbound(rx, out_tx));

        tx.send(TransportEvent::Malformed("payload is not valid UTF-8".into()))
            .await
            .unwrap();
        drop(tx);

        assert_eq!(
            out_rx.recv().await,
            Some(PeerEvent::Malformed {
                error: "payload is not valid UTF-8".into()
            })
        );
        assert!(out_rx.recv().await.is_none());
        pump.await.unwrap();
    }
}
