//! Crowd news report submission with a client-side rate limit.
//!
//! The submission history is a JSON list of unix-millisecond timestamps kept
//! in the persistent cache, so the limit survives restarts.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use lifeline_shared::capabilities::PersistentCache;
use lifeline_shared::constants::{
    MAX_REPORTS_PER_WINDOW, MAX_REPORT_WORDS, REPORT_HISTORY_CACHE_KEY, REPORT_WINDOW_SECS,
};
use lifeline_shared::error::{CacheError, DeliveryError};
use lifeline_shared::types::Urgency;

use crate::backend::ReportDelivery;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportCategory {
    Earthquake,
    Storm,
    Disease,
    Disaster,
    Rescue,
    Other,
}

impl ReportCategory {
    pub const ALL: [ReportCategory; 6] = [
        Self::Earthquake,
        Self::Storm,
        Self::Disease,
        Self::Disaster,
        Self::Rescue,
        Self::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Earthquake => "earthquake",
            Self::Storm => "storm",
            Self::Disease => "disease",
            Self::Disaster => "disaster",
            Self::Rescue => "rescue",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ReportCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportCategory {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| ReportError::UnknownCategory(s.to_string()))
    }
}

/// Body posted to the report endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsReport {
    pub content: String,
    pub category: ReportCategory,
    pub level: Urgency,
    pub timestamp: String,
}

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Please enter a report")]
    Empty,

    #[error("Unknown report category: {0}")]
    UnknownCategory(String),

    #[error("Report has {words} words (max {})", MAX_REPORT_WORDS)]
    TooLong { words: usize },

    #[error("You can only submit {} reports per minute, try again in {retry_after_secs}s", MAX_REPORTS_PER_WINDOW)]
    RateLimited { retry_after_secs: i64 },

    #[error("Failed to submit report: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Submission history unavailable: {0}")]
    History(#[from] CacheError),
}

/// Check a report before it touches the network or the history.
pub fn validate(content: &str) -> Result<(), ReportError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(ReportError::Empty);
    }
    let words = trimmed.split_whitespace().count();
    if words > MAX_REPORT_WORDS {
        return Err(ReportError::TooLong { words });
    }
    Ok(())
}

pub struct ReportSubmitter {
    delivery: Arc<dyn ReportDelivery>,
    history: Arc<dyn PersistentCache>,
    lock: Mutex<()>,
}

impl ReportSubmitter {
    pub fn new(delivery: Arc<dyn ReportDelivery>, history: Arc<dyn PersistentCache>) -> Self {
        Self {
            delivery,
            history,
            lock: Mutex::new(()),
        }
    }

    /// Validate, charge the rate limit and send. A submission counts against
    /// the limit even when delivery then fails.
    pub async fn submit(
        &self,
        content: &str,
        category: ReportCategory,
        level: Urgency,
        now: DateTime<Utc>,
    ) -> Result<NewsReport, ReportError> {
        validate(content)?;

        {
            let _guard = self.lock.lock().await;
            let mut history = self.load_history(now).await?;

            if history.len() >= MAX_REPORTS_PER_WINDOW {
                let oldest = history.iter().min().copied().unwrap_or(now.timestamp_millis());
                let window_ms = REPORT_WINDOW_SECS * 1000;
                let retry_after_secs = ((oldest + window_ms - now.timestamp_millis()) + 999) / 1000;
                warn!(recent = history.len(), retry_after_secs, "Report rate limit hit");
                return Err(ReportError::RateLimited { retry_after_secs });
            }

            history.push(now.timestamp_millis());
            self.save_history(&history).await?;
        }

        let report = NewsReport {
            content: content.to_string(),
            category,
            level,
            timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        };
        self.delivery.send_report(&report).await?;

        info!(%category, "Report accepted");
        Ok(report)
    }

    /// Timestamps inside the current window. A corrupt history is reset.
    async fn load_history(&self, now: DateTime<Utc>) -> Result<Vec<i64>, ReportError> {
        let cutoff = (now - Duration::seconds(REPORT_WINDOW_SECS)).timestamp_millis();
        let raw = self.history.get(REPORT_HISTORY_CACHE_KEY).await?;

        let all: Vec<i64> = match raw {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(error = %e, "Report history is corrupt, starting over");
                Vec::new()
            }),
            None => Vec::new(),
        };
        Ok(all.into_iter().filter(|t| *t > cutoff).collect())
    }

    async fn save_history(&self, history: &[i64]) -> Result<(), ReportError> {
        let raw = serde_json::to_string(history)
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        self.history.set(REPORT_HISTORY_CACHE_KEY, &raw).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use lifeline_store::MemoryCache;

    #[derive(Default)]
    struct FakeDelivery {
        sent: StdMutex<Vec<NewsReport>>,
        fail: bool,
    }

    #[async_trait]
    impl ReportDelivery for FakeDelivery {
        async fn send_report(&self, report: &NewsReport) -> Result<(), DeliveryError> {
            if self.fail {
                return Err(DeliveryError::Transport("offline".into()));
            }
            self.sent.lock().unwrap().push(report.clone());
            Ok(())
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_743_140_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_validation() {
        assert!(matches!(validate("  "), Err(ReportError::Empty)));
        let long = vec!["word"; MAX_REPORT_WORDS + 1].join(" ");
        assert!(matches!(
            validate(&long),
            Err(ReportError::TooLong { words }) if words == MAX_REPORT_WORDS + 1
        ));
        assert!(validate("Bridge collapsed on Strand Road").is_ok());
    }

    #[test]
    fn test_category_parse() {
        assert_eq!("Rescue".parse::<ReportCategory>().unwrap(), ReportCategory::Rescue);
        assert!("tsunami".parse::<ReportCategory>().is_err());
    }

    #[tokio::test]
    async fn test_sixth_report_in_window_is_rejected() {
        let delivery = Arc::new(FakeDelivery::default());
        let submitter = ReportSubmitter::new(delivery.clone(), Arc::new(MemoryCache::new()));

        for i in 0..5 {
            submitter
                .submit("Road blocked", ReportCategory::Disaster, Urgency::High, at(i * 5))
                .await
                .unwrap();
        }

        let err = submitter
            .submit("Road blocked", ReportCategory::Disaster, Urgency::High, at(30))
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::RateLimited { retry_after_secs: 30 }));
        assert_eq!(delivery.sent.lock().unwrap().len(), 5);

        // First submission has left the window.
        submitter
            .submit("Road clear", ReportCategory::Other, Urgency::Normal, at(61))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_failed_delivery_still_counts() {
        let cache = Arc::new(MemoryCache::new());
        let submitter = ReportSubmitter::new(
            Arc::new(FakeDelivery {
                fail: true,
                ..Default::default()
            }),
            cache.clone(),
        );

        let err = submitter
            .submit("Fire", ReportCategory::Other, Urgency::Critical, at(0))
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::Delivery(_)));

        let raw = cache.get(REPORT_HISTORY_CACHE_KEY).await.unwrap().unwrap();
        let history: Vec<i64> = serde_json::from_str(&raw).unwrap();
        assert_eq!(history, vec![at(0).timestamp_millis()]);
    }

    #[tokio::test]
    async fn test_report_body_shape() {
        let delivery = Arc::new(FakeDelivery::default());
        let submitter = ReportSubmitter::new(delivery.clone(), Arc::new(MemoryCache::new()));
        submitter
            .submit("Aftershock felt", ReportCategory::Earthquake, Urgency::Critical, at(0))
            .await
            .unwrap();

        let sent = delivery.sent.lock().unwrap()[0].clone();
        let json = serde_json::to_value(&sent).unwrap();
        assert_eq!(json["category"], "earthquake");
        assert_eq!(json["level"], "critical");
        assert_eq!(json["content"], "Aftershock felt");
        assert!(json["timestamp"].as_str().unwrap().ends_with('Z'));
    }
}
