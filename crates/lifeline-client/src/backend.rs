//! Networked delivery to the rescue backend.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info, warn};

use lifeline_shared::constants::USER_AGENT;
use lifeline_shared::error::DeliveryError;
use lifeline_shared::protocol::{SosEnvelope, SosNotification};
use lifeline_shared::types::SosMessage;

use crate::reports::NewsReport;

const SOS_PATH: &str = "/api/sos/sendsos";
const NOTIFY_PATH: &str = "/api/noti/notify-sos";
const REPORT_PATH: &str = "/api/reports/sendreportnews";

/// Delivers an SOS over the internet.
#[async_trait]
pub trait SosDelivery: Send + Sync {
    async fn deliver(&self, message: &SosMessage) -> Result<(), DeliveryError>;
}

/// Sends crowd news reports.
#[async_trait]
pub trait ReportDelivery: Send + Sync {
    async fn send_report(&self, report: &NewsReport) -> Result<(), DeliveryError>;
}

#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(request_timeout)
            .build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post_json<T: Serialize + ?Sized>(
        &self,
        endpoint: &'static str,
        body: &T,
    ) -> Result<(), DeliveryError> {
        let url = format!("{}{endpoint}", self.base_url);
        debug!(%url, "POST");

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(endpoint, status = status.as_u16(), "Backend rejected request");
            return Err(DeliveryError::Status {
                endpoint,
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SosDelivery for HttpBackend {
    /// Submit the SOS, then ask the backend to fan out the push
    /// notification. Both calls must succeed.
    async fn deliver(&self, message: &SosMessage) -> Result<(), DeliveryError> {
        if message.coordinates().is_none() {
            return Err(DeliveryError::MissingCoordinates);
        }

        self.post_json(SOS_PATH, &SosEnvelope::from_message(message))
            .await?;
        self.post_json(NOTIFY_PATH, &SosNotification::for_message(message))
            .await?;

        info!(text_len = message.text().len(), "SOS delivered to backend");
        Ok(())
    }
}

#[async_trait]
impl ReportDelivery for HttpBackend {
    async fn send_report(&self, report: &NewsReport) -> Result<(), DeliveryError> {
        self.post_json(REPORT_PATH, report).await?;
        info!(category = %report.category, level = ?report.level, "News report submitted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use lifeline_shared::types::Coordinates;
    use serde_json::Value;

    #[derive(Clone, Default)]
    struct Recorder {
        hits: Arc<Mutex<Vec<(String, Value)>>>,
        sos_status: Arc<Mutex<Option<StatusCode>>>,
    }

    impl Recorder {
        fn hits(&self) -> Vec<(String, Value)> {
            self.hits.lock().unwrap().clone()
        }
    }

    async fn spawn_backend(recorder: Recorder) -> String {
        async fn sos(State(r): State<Recorder>, Json(body): Json<Value>) -> StatusCode {
            r.hits.lock().unwrap().push((SOS_PATH.to_string(), body));
            r.sos_status.lock().unwrap().unwrap_or(StatusCode::CREATED)
        }
        async fn notify(State(r): State<Recorder>, Json(body): Json<Value>) -> StatusCode {
            r.hits.lock().unwrap().push((NOTIFY_PATH.to_string(), body));
            StatusCode::OK
        }
        async fn report(State(r): State<Recorder>, Json(body): Json<Value>) -> StatusCode {
            r.hits.lock().unwrap().push((REPORT_PATH.to_string(), body));
            StatusCode::OK
        }

        let app = Router::new()
            .route(SOS_PATH, post(sos))
            .route(NOTIFY_PATH, post(notify))
            .route(REPORT_PATH, post(report))
            .with_state(recorder);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/")
    }

    fn message() -> SosMessage {
        SosMessage::new(
            "Flooded, need boat",
            Some(Coordinates::new(16.8661, 96.1951)),
            "2025-03-28T06:30:00Z".parse().unwrap(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_deliver_posts_sos_then_notification() {
        let recorder = Recorder::default();
        let base = spawn_backend(recorder.clone()).await;
        let backend = HttpBackend::new(base, Duration::from_secs(5)).unwrap();

        backend.deliver(&message()).await.unwrap();

        let hits = recorder.hits();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, SOS_PATH);
        assert_eq!(hits[0].1["message"], "Flooded, need boat");
        assert_eq!(hits[0].1["coordinates"]["type"], "Point");
        assert_eq!(hits[0].1["coordinates"]["coordinates"][0], 96.1951);
        assert_eq!(hits[1].0, NOTIFY_PATH);
        assert_eq!(hits[1].1["title"], "Flooded, need boat");
        assert!(hits[1].1["body"]
            .as_str()
            .unwrap()
            .contains("Lat: 16.8661, Long: 96.1951"));
    }

    #[tokio::test]
    async fn test_rejected_sos_skips_notification() {
        let recorder = Recorder::default();
        *recorder.sos_status.lock().unwrap() = Some(StatusCode::INTERNAL_SERVER_ERROR);
        let base = spawn_backend(recorder.clone()).await;
        let backend = HttpBackend::new(base, Duration::from_secs(5)).unwrap();

        let err = backend.deliver(&message()).await.unwrap_err();
        assert!(matches!(
            err,
            DeliveryError::Status {
                endpoint: SOS_PATH,
                status: 500
            }
        ));
        assert_eq!(recorder.hits().len(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_transport_error() {
        let port = {
            let socket = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            socket.local_addr().unwrap().port()
        };
        let backend =
            HttpBackend::new(format!("http://127.0.0.1:{port}"), Duration::from_secs(2)).unwrap();

        let err = backend.deliver(&message()).await.unwrap_err();
        assert!(matches!(err, DeliveryError::Transport(_)));
    }

    #[tokio::test]
    async fn test_message_without_coordinates_is_not_sent() {
        let backend = HttpBackend::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
        let bare = SosMessage::new("HELP", None, chrono::Utc::now()).unwrap();
        assert!(matches!(
            backend.deliver(&bare).await,
            Err(DeliveryError::MissingCoordinates)
        ));
    }
}
