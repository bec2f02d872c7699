//! Active SOS listing from the Lifeline backend.
//!
//! Used for the "SOS nearby" indicator; not registered in the default
//! aggregate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use lifeline_shared::error::SourceError;
use lifeline_shared::protocol::GeoPoint;
use lifeline_shared::types::{Coordinates, EmergencyRecord, RecordKind, Urgency};

use super::decode_items;
use crate::http::fetch_json;
use crate::source::{EmergencySource, SourceReport};

pub const SOS_LIST_PATH: &str = "/api/sos/showSOS";
const SOURCE_NAME: &str = "SOS Board";

pub struct SosBoard {
    client: Client,
    url: String,
}

impl SosBoard {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            url: format!("{}{SOS_LIST_PATH}", base_url.trim_end_matches('/')),
        }
    }

    async fn fetch_records(&self) -> Result<Vec<EmergencyRecord>, SourceError> {
        let response: SosListResponse = fetch_json(self.client.get(&self.url)).await?;
        let records = map_sos_list(response)?;
        info!(count = records.len(), "SOS board fetched");
        Ok(records)
    }
}

#[async_trait]
impl EmergencySource for SosBoard {
    fn name(&self) -> &'static str {
        "sos"
    }

    async fn fetch(&self) -> SourceReport {
        SourceReport::from_result(SOURCE_NAME, self.fetch_records().await)
    }
}

#[derive(Debug, Deserialize)]
pub struct SosListResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub data: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct RawSos {
    #[serde(rename = "_id")]
    id: String,
    message: String,
    #[serde(default)]
    status: Option<String>,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    coordinates: Option<GeoPoint>,
}

pub fn map_sos_list(response: SosListResponse) -> Result<Vec<EmergencyRecord>, SourceError> {
    if !response.success {
        return Err(SourceError::Empty("No SOS messages found".to_string()));
    }

    Ok(decode_items::<RawSos>(SOURCE_NAME, response.data)
        .into_iter()
        .map(|sos| {
            let coordinates = sos
                .coordinates
                .as_ref()
                .and_then(|point| Coordinates::from_lon_lat(&point.coordinates));
            let status = sos.status.as_deref().unwrap_or("ACTIVE");

            EmergencyRecord {
                id: sos.id,
                title: format!("SOS ({status})"),
                content: sos.message,
                source: SOURCE_NAME.to_string(),
                kind: RecordKind::Reports,
                timestamp: sos.timestamp,
                urgency: Urgency::Critical,
                location: coordinates
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "Unknown location".to_string()),
                coordinates,
                external_link: None,
            }
        })
        .collect())
}
