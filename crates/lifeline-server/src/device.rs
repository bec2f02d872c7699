//! Host-side implementations of the device capabilities.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use lifeline_shared::capabilities::{
    Alert, AlertSeverity, AlertSink, LocationProvider, NetworkReachability,
};
use lifeline_shared::constants::USER_AGENT;
use lifeline_shared::error::LocationError;
use lifeline_shared::types::Coordinates;

/// Online when the backend answers at all, whatever the status code.
pub struct HttpReachability {
    client: Client,
    probe_url: String,
}

impl HttpReachability {
    pub fn new(probe_url: impl Into<String>, timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            probe_url: probe_url.into(),
        })
    }
}

#[async_trait]
impl NetworkReachability for HttpReachability {
    async fn is_connected(&self) -> bool {
        match self.client.head(&self.probe_url).send().await {
            Ok(response) => {
                debug!(status = response.status().as_u16(), "Backend reachable");
                true
            }
            Err(e) => {
                info!(error = %e, "Backend unreachable, treating device as offline");
                false
            }
        }
    }
}

/// Position configured for this node.
pub struct FixedLocation {
    coordinates: Option<Coordinates>,
}

impl FixedLocation {
    pub fn new(coordinates: Option<Coordinates>) -> Self {
        Self { coordinates }
    }
}

#[async_trait]
impl LocationProvider for FixedLocation {
    async fn current_location(&self) -> Result<Coordinates, LocationError> {
        self.coordinates.ok_or_else(|| {
            LocationError::Unavailable("no device location configured".to_string())
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredAlert {
    pub id: Uuid,
    pub raised_at: DateTime<Utc>,
    #[serde(flatten)]
    pub alert: Alert,
}

/// Alert sink for a headless node: every alert is logged and kept, newest
/// first, until the UI shell acknowledges it.
pub struct AlertInbox {
    alerts: Mutex<VecDeque<StoredAlert>>,
    capacity: usize,
}

impl AlertInbox {
    pub fn new(capacity: usize) -> Self {
        Self {
            alerts: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn list(&self) -> Vec<StoredAlert> {
        self.alerts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn acknowledge(&self, id: Uuid) -> bool {
        let mut alerts = self.alerts.lock().unwrap_or_else(PoisonError::into_inner);
        let before = alerts.len();
        alerts.retain(|a| a.id != id);
        alerts.len() != before
    }
}

impl AlertSink for AlertInbox {
    fn show(&self, alert: Alert) {
        match alert.severity {
            AlertSeverity::Info => info!(title = %alert.title, body = %alert.body, "Alert"),
            AlertSeverity::Warning => warn!(title = %alert.title, body = %alert.body, "Alert"),
            AlertSeverity::Error => {
                error!(title = %alert.title, body = %alert.body, kind = ?alert.kind, "Alert")
            }
        }

        let mut alerts = self.alerts.lock().unwrap_or_else(PoisonError::into_inner);
        alerts.push_front(StoredAlert {
            id: Uuid::new_v4(),
            raised_at: Utc::now(),
            alert,
        });
        alerts.truncate(self.capacity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lifeline_shared::error::ErrorKind;

    #[test]
    fn test_inbox_keeps_newest_alerts() {
        let inbox = AlertInbox::new(2);
        inbox.show(Alert::info("one", ""));
        inbox.show(Alert::info("two", ""));
        inbox.show(Alert::failure(ErrorKind::RadioDisabled, "three", ""));

        let titles: Vec<String> = inbox.list().into_iter().map(|a| a.alert.title).collect();
        assert_eq!(titles, ["three", "two"]);
    }

    #[test]
    fn test_acknowledge_removes_alert() {
        let inbox = AlertInbox::new(10);
        inbox.show(Alert::info("SOS received", "HELP"));
        let id = inbox.list()[0].id;

        assert!(inbox.acknowledge(id));
        assert!(!inbox.acknowledge(id));
        assert!(inbox.list().is_empty());
    }

    #[tokio::test]
    async fn test_fixed_location() {
        let here = Coordinates::new(21.9588, 96.0891);
        assert_eq!(FixedLocation::new(Some(here)).current_location().await, Ok(here));
        assert!(matches!(
            FixedLocation::new(None).current_location().await,
            Err(LocationError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_offline() {
        let port = {
            let socket = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            socket.local_addr().unwrap().port()
        };
        let probe =
            HttpReachability::new(format!("http://127.0.0.1:{port}/"), Duration::from_secs(1))
                .unwrap();
        assert!(!probe.is_connected().await);
    }
}
