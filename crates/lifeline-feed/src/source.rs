use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use lifeline_shared::error::SourceError;
use lifeline_shared::types::EmergencyRecord;

/// Outcome of one adapter fetch. Adapters never fail past this shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceReport {
    pub success: bool,
    pub count: usize,
    pub data: Vec<EmergencyRecord>,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SourceReport {
    pub fn ok(source: impl Into<String>, data: Vec<EmergencyRecord>) -> Self {
        Self {
            success: true,
            count: data.len(),
            data,
            source: source.into(),
            error: None,
        }
    }

    pub fn failed(source: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            count: 0,
            data: Vec::new(),
            source: source.into(),
            error: Some(error.into()),
        }
    }

    pub fn from_result(
        source: impl Into<String>,
        result: Result<Vec<EmergencyRecord>, SourceError>,
    ) -> Self {
        match result {
            Ok(data) => Self::ok(source, data),
            Err(e) => Self::failed(source, e.to_string()),
        }
    }
}

/// One upstream data source, normalized to [`EmergencyRecord`]s.
#[async_trait]
pub trait EmergencySource: Send + Sync {
    /// Stable key for per-source counts (`earthquake`, `storm`, ...).
    fn name(&self) -> &'static str;

    async fn fetch(&self) -> SourceReport;
}
