//! Receiver session: while this node hosts the peer group, every inbound SOS
//! is stored in the inbox and raised as a local alert.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use lifeline_net::PeerEvent;
use lifeline_shared::capabilities::{Alert, AlertSink};
use lifeline_shared::protocol::ReceivedSos;
use lifeline_store::Database;

pub fn spawn_receiver(
    mut events: mpsc::Receiver<PeerEvent>,
    db: Arc<Mutex<Database>>,
    alerts: Arc<dyn AlertSink>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Receiver session started");
        while let Some(event) = events.recv().await {
            match event {
                PeerEvent::MessageReceived(sos) => {
                    store(&db, &sos).await;
                    alerts.show(sos_alert(&sos));
                }
                PeerEvent::Malformed { error } => {
                    warn!(%error, "Ignoring malformed SOS from peer");
                }
                PeerEvent::GroupOwnerIpReceived(ip) => {
                    info!(owner = %ip, "Group owner address received");
                }
                PeerEvent::PeersChanged(peers) => {
                    debug!(count = peers.len(), "Peer list changed");
                }
            }
        }
        info!("Receiver session ended");
    })
}

async fn store(db: &Arc<Mutex<Database>>, sos: &ReceivedSos) {
    let db = Arc::clone(db);
    let sos = sos.clone();
    let result = tokio::task::spawn_blocking(move || {
        let db = db.lock().unwrap_or_else(PoisonError::into_inner);
        db.record_inbound_sos(&sos, Utc::now())
    })
    .await;

    match result {
        Ok(Ok(id)) => debug!(id, "Inbound SOS stored"),
        Ok(Err(e)) => warn!(error = %e, "Failed to store inbound SOS"),
        Err(e) => warn!(error = %e, "Inbox write task failed"),
    }
}

fn sos_alert(sos: &ReceivedSos) -> Alert {
    let location = sos
        .coordinates
        .map(|c| c.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    Alert::info(
        "SOS received",
        format!("{}\nLocation: {location}", sos.message),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use lifeline_net::sim::RecordingAlerts;
    use lifeline_shared::types::Coordinates;

    #[tokio::test]
    async fn test_inbound_sos_is_stored_and_alerted() {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(Mutex::new(
            Database::open_at(&dir.path().join("node.db")).unwrap(),
        ));
        let alerts = Arc::new(RecordingAlerts::default());
        let (tx, rx) = mpsc::channel(8);
        let handle = spawn_receiver(rx, db.clone(), alerts.clone());

        tx.send(PeerEvent::Malformed {
            error: "bad json".into(),
        })
        .await
        .unwrap();
        tx.send(PeerEvent::MessageReceived(ReceivedSos {
            message: "HELP ME!".into(),
            coordinates: Some(Coordinates::new(16.8661, 96.1951)),
            timestamp: None,
        }))
        .await
        .unwrap();
        drop(tx);
        handle.await.unwrap();

        let inbox = db.lock().unwrap().list_inbound_sos(10).unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].message, "HELP ME!");

        let raised = alerts.alerts();
        assert_eq!(raised.len(), 1);
        assert!(raised[0].body.contains("Lat: 16.8661, Long: 96.1951"));
    }
}
