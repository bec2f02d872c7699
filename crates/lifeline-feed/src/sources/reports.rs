//! Crowd-submitted news reports from the Lifeline backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use lifeline_shared::error::SourceError;
use lifeline_shared::types::{EmergencyRecord, RecordKind, Urgency};

use super::decode_items;
use crate::http::fetch_json;
use crate::source::{EmergencySource, SourceReport};

pub const REPORTS_PATH: &str = "/api/reports/getmobilereportnews";
const SOURCE_NAME: &str = "Community Reports";
const RECORD_SOURCE: &str = "Local People";

pub struct CommunityReports {
    client: Client,
    url: String,
    location: String,
}

impl CommunityReports {
    /// `base_url` is the backend root; `location` labels every record.
    pub fn new(client: Client, base_url: &str, location: impl Into<String>) -> Self {
        Self {
            client,
            url: format!("{}{REPORTS_PATH}", base_url.trim_end_matches('/')),
            location: location.into(),
        }
    }

    async fn fetch_records(&self) -> Result<Vec<EmergencyRecord>, SourceError> {
        let response: ReportsResponse = fetch_json(self.client.get(&self.url)).await?;
        let records = map_reports(response, &self.location);
        info!(count = records.len(), "Community reports fetched");
        Ok(records)
    }
}

#[async_trait]
impl EmergencySource for CommunityReports {
    fn name(&self) -> &'static str {
        "reports"
    }

    async fn fetch(&self) -> SourceReport {
        SourceReport::from_result(SOURCE_NAME, self.fetch_records().await)
    }
}

#[derive(Debug, Deserialize)]
pub struct ReportsResponse {
    #[serde(default)]
    pub data: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReport {
    id: Value,
    category: String,
    content: String,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    level: Option<String>,
}

/// Ids arrive as strings or numbers depending on the backend version.
fn id_string(id: &Value) -> Option<String> {
    match id {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn map_reports(response: ReportsResponse, location: &str) -> Vec<EmergencyRecord> {
    decode_items::<RawReport>(SOURCE_NAME, response.data)
        .into_iter()
        .filter_map(|report| {
            Some(EmergencyRecord {
                id: id_string(&report.id)?,
                title: report.category,
                content: report.content,
                source: RECORD_SOURCE.to_string(),
                kind: RecordKind::Reports,
                timestamp: report.timestamp,
                urgency: report
                    .level
                    .as_deref()
                    .map(Urgency::parse_lenient)
                    .unwrap_or(Urgency::Normal),
                location: location.to_string(),
                coordinates: None,
                external_link: None,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_reports() {
        let response: ReportsResponse = serde_json::from_str(
            r#"{"data": [
                {"id": 42, "category": "Earthquake", "content": "Bridge collapsed near Sagaing",
                 "timestamp": "2025-03-28T07:00:00.000Z", "level": "critical", "status": "open", "isResolved": false},
                {"id": "a1", "category": "Rescue", "content": "Need boats",
                 "timestamp": "2025-03-28T08:00:00Z"},
                {"id": null, "category": "Other", "content": "no id", "timestamp": "2025-03-28T08:00:00Z"},
                {"id": "b2", "category": "Storm", "content": "bad time", "timestamp": "yesterday"}
            ]}"#,
        )
        .unwrap();

        let records = map_reports(response, "Myanmar");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "42");
        assert_eq!(records[0].title, "Earthquake");
        assert_eq!(records[0].urgency, Urgency::Critical);
        assert_eq!(records[0].source, "Local People");
        assert_eq!(records[0].location, "Myanmar");
        assert_eq!(records[1].urgency, Urgency::Normal);
    }

    #[test]
    fn test_url_joins_base() {
        let client = Client::new();
        let source = CommunityReports::new(client, "https://sos-mm.fly.dev/", "Myanmar");
        assert_eq!(
            source.url,
            "https://sos-mm.fly.dev/api/reports/getmobilereportnews"
        );
    }
}
