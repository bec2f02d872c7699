//! Fan-out, merge and cache of the emergency feed.
//!
//! A fresh cached aggregate is served without touching the network. Otherwise
//! every source is fetched concurrently, each under its own deadline, and the
//! successful ones are merged newest first. Only a non-empty aggregate is
//! written back to the cache, so a total outage never displaces a good entry.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use lifeline_shared::capabilities::PersistentCache;
use lifeline_shared::config::Tunables;
use lifeline_shared::constants::AGGREGATE_CACHE_KEY;
use lifeline_shared::error::SourceError;
use lifeline_shared::types::{EmergencyRecord, RecordKind};

use crate::source::{EmergencySource, SourceReport};

/// Persisted aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateCacheEntry {
    pub records: Vec<EmergencyRecord>,
    pub per_source_counts: BTreeMap<String, usize>,
    pub fetched_at: DateTime<Utc>,
}

/// What callers of the aggregator receive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateResult {
    pub success: bool,
    pub count: usize,
    pub data: Vec<EmergencyRecord>,
    pub sources: BTreeMap<String, usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
    pub fetched_at: DateTime<Utc>,
    #[serde(default)]
    pub cached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AggregateResult {
    fn from_cache(entry: AggregateCacheEntry) -> Self {
        Self {
            success: !entry.records.is_empty(),
            count: entry.records.len(),
            data: entry.records,
            sources: entry.per_source_counts,
            errors: None,
            fetched_at: entry.fetched_at,
            cached: true,
            error: None,
        }
    }

    /// Same result restricted to one record kind.
    pub fn filtered(&self, kind: RecordKind) -> Self {
        let data: Vec<EmergencyRecord> = self
            .data
            .iter()
            .filter(|r| r.kind == kind)
            .cloned()
            .collect();
        Self {
            count: data.len(),
            data,
            ..self.clone()
        }
    }
}

/// Fans out to every emergency source and caches the merged feed.
pub struct FeedAggregator {
    sources: Vec<Arc<dyn EmergencySource>>,
    cache: Arc<dyn PersistentCache>,
    tunables: Tunables,
}

impl FeedAggregator {
    pub fn new(
        sources: Vec<Arc<dyn EmergencySource>>,
        cache: Arc<dyn PersistentCache>,
        tunables: Tunables,
    ) -> Self {
        Self {
            sources,
            cache,
            tunables,
        }
    }

    /// Names of the registered sources, in registration order.
    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Serve the cached aggregate while fresh, otherwise fetch.
    pub async fn get_aggregate(&self) -> AggregateResult {
        if let Some(entry) = self.read_fresh_cache().await {
            info!(count = entry.records.len(), "Serving cached emergency feed");
            return AggregateResult::from_cache(entry);
        }
        self.fetch_all().await
    }

    /// Fetch regardless of cache freshness (pull-to-refresh).
    pub async fn refresh(&self) -> AggregateResult {
        self.fetch_all().await
    }

    async fn read_fresh_cache(&self) -> Option<AggregateCacheEntry> {
        let raw = match self.cache.get(AGGREGATE_CACHE_KEY).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "Feed cache read failed, treating as miss");
                return None;
            }
        };

        let entry: AggregateCacheEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Feed cache entry is corrupt, treating as miss");
                return None;
            }
        };

        // A timestamp in the future fails the conversion and counts as stale.
        let fresh = (Utc::now() - entry.fetched_at)
            .to_std()
            .map(|age| age < self.tunables.cache_ttl)
            .unwrap_or(false);
        if !fresh {
            debug!(fetched_at = %entry.fetched_at, "Feed cache entry expired");
            return None;
        }
        Some(entry)
    }

    async fn fetch_all(&self) -> AggregateResult {
        let deadline = self.tunables.source_timeout;
        let reports = join_all(self.sources.iter().map(|source| async move {
            match tokio::time::timeout(deadline, source.fetch()).await {
                Ok(report) => report,
                Err(_) => {
                    warn!(source = source.name(), ?deadline, "Source timed out");
                    SourceReport::failed(source.name(), SourceError::Timeout.to_string())
                }
            }
        }))
        .await;

        let mut seen = HashSet::new();
        let mut records = Vec::new();
        let mut counts = BTreeMap::new();
        let mut errors = Vec::new();

        for (source, report) in self.sources.iter().zip(reports) {
            let name = source.name();
            if !report.success {
                let reason = report.error.as_deref().unwrap_or("Unknown error");
                warn!(source = name, error = %reason, "Source failed");
                errors.push(format!("{name} service: {reason}"));
                counts.insert(name.to_string(), 0);
                continue;
            }

            let before = records.len();
            for record in report.data {
                if seen.insert((record.source.clone(), record.id.clone())) {
                    records.push(record);
                } else {
                    debug!(source = name, id = %record.id, "Dropping duplicate record");
                }
            }
            counts.insert(name.to_string(), records.len() - before);
        }

        // Stable: equal timestamps keep source registration order.
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        let fetched_at = Utc::now();
        let success = !records.is_empty();
        info!(
            count = records.len(),
            failed_sources = errors.len(),
            "Emergency feed aggregated"
        );

        if success {
            let entry = AggregateCacheEntry {
                records: records.clone(),
                per_source_counts: counts.clone(),
                fetched_at,
            };
            self.write_cache(&entry).await;
        }

        let error = if success {
            None
        } else if errors.is_empty() {
            Some("No emergency data available".to_string())
        } else {
            Some(errors.join("; "))
        };

        AggregateResult {
            success,
            count: records.len(),
            data: records,
            sources: counts,
            errors: (!errors.is_empty()).then_some(errors),
            fetched_at,
            cached: false,
            error,
        }
    }

    async fn write_cache(&self, entry: &AggregateCacheEntry) {
        let raw = match serde_json::to_string(entry) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Failed to serialize feed cache entry");
                return;
            }
        };
        if let Err(e) = self.cache.set(AGGREGATE_CACHE_KEY, &raw).await {
            warn!(error = %e, "Failed to write feed cache");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use lifeline_shared::types::Urgency;
    use lifeline_store::MemoryCache;

    struct FakeSource {
        name: &'static str,
        records: Vec<EmergencyRecord>,
        delay: Duration,
        fail: bool,
        calls: AtomicUsize,
    }

    impl FakeSource {
        fn new(name: &'static str, records: Vec<EmergencyRecord>) -> Self {
            Self {
                name,
                records,
                delay: Duration::ZERO,
                fail: false,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing(name: &'static str) -> Self {
            Self {
                fail: true,
                ..Self::new(name, Vec::new())
            }
        }

        fn slow(name: &'static str, records: Vec<EmergencyRecord>) -> Self {
            Self {
                delay: Duration::from_secs(30),
                ..Self::new(name, records)
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EmergencySource for FakeSource {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn fetch(&self) -> SourceReport {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail {
                SourceReport::failed(self.name, "HTTP 503")
            } else {
                SourceReport::ok(self.name, self.records.clone())
            }
        }
    }

    fn record(source: &str, id: &str, kind: RecordKind, minute: u32) -> EmergencyRecord {
        EmergencyRecord {
            id: id.to_string(),
            title: format!("{source} {id}"),
            content: String::new(),
            source: source.to_string(),
            kind,
            timestamp: format!("2025-03-28T06:{minute:02}:00Z").parse().unwrap(),
            urgency: Urgency::Normal,
            location: "Mandalay".to_string(),
            coordinates: None,
            external_link: None,
        }
    }

    fn aggregator(
        sources: Vec<Arc<FakeSource>>,
        cache: Arc<MemoryCache>,
    ) -> FeedAggregator {
        FeedAggregator::new(
            sources
                .into_iter()
                .map(|s| s as Arc<dyn EmergencySource>)
                .collect(),
            cache,
            Tunables::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_call_within_ttl_is_served_from_cache() {
        let quakes = Arc::new(FakeSource::new(
            "earthquake",
            vec![record("usgs", "q1", RecordKind::Earthquake, 10)],
        ));
        let reports = Arc::new(FakeSource::new(
            "reports",
            vec![record("local", "r1", RecordKind::Reports, 20)],
        ));
        let feed = aggregator(vec![quakes.clone(), reports.clone()], Arc::new(MemoryCache::new()));

        let first = feed.get_aggregate().await;
        assert!(first.success);
        assert!(!first.cached);

        let second = feed.get_aggregate().await;
        assert!(second.cached);
        assert_eq!(second.data, first.data);
        assert_eq!(second.sources, first.sources);
        assert_eq!(quakes.calls(), 1);
        assert_eq!(reports.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_source_counts_zero() {
        let quakes = Arc::new(FakeSource::new(
            "earthquake",
            vec![
                record("usgs", "q1", RecordKind::Earthquake, 5),
                record("usgs", "q2", RecordKind::Earthquake, 40),
            ],
        ));
        let storms = Arc::new(FakeSource::slow(
            "storm",
            vec![record("met", "s1", RecordKind::Storm, 59)],
        ));
        let reports = Arc::new(FakeSource::new(
            "reports",
            vec![record("local", "r1", RecordKind::Reports, 20)],
        ));
        let feed = aggregator(
            vec![quakes, storms, reports],
            Arc::new(MemoryCache::new()),
        );

        let result = feed.get_aggregate().await;
        assert!(result.success);
        assert_eq!(result.count, 3);
        assert_eq!(result.sources["storm"], 0);
        assert_eq!(result.sources["earthquake"], 2);
        assert_eq!(result.sources["reports"], 1);

        let ids: Vec<&str> = result.data.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["q2", "r1", "q1"]);

        let errors = result.errors.unwrap();
        assert_eq!(errors, ["storm service: Timeout"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_total_failure_keeps_prior_cache_entry() {
        let cache = Arc::new(MemoryCache::new());
        let prior = AggregateCacheEntry {
            records: vec![record("usgs", "q1", RecordKind::Earthquake, 1)],
            per_source_counts: BTreeMap::from([("earthquake".to_string(), 1)]),
            fetched_at: Utc::now(),
        };
        let prior_raw = serde_json::to_string(&prior).unwrap();
        cache.set(AGGREGATE_CACHE_KEY, &prior_raw).await.unwrap();

        let feed = aggregator(
            vec![
                Arc::new(FakeSource::failing("earthquake")),
                Arc::new(FakeSource::failing("storm")),
            ],
            cache.clone(),
        );

        let result = feed.refresh().await;
        assert!(!result.success);
        assert_eq!(result.count, 0);
        assert!(result.data.is_empty());
        assert_eq!(result.sources["earthquake"], 0);
        assert_eq!(result.sources["storm"], 0);
        assert!(result.error.unwrap().contains("earthquake service: HTTP 503"));

        assert_eq!(
            cache.get(AGGREGATE_CACHE_KEY).await.unwrap().as_deref(),
            Some(prior_raw.as_str())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_corrupt_or_stale_cache_is_a_miss() {
        let cache = Arc::new(MemoryCache::new());
        let quakes = Arc::new(FakeSource::new(
            "earthquake",
            vec![record("usgs", "q1", RecordKind::Earthquake, 1)],
        ));
        let feed = aggregator(vec![quakes.clone()], cache.clone());

        cache.set(AGGREGATE_CACHE_KEY, "{not json").await.unwrap();
        assert!(!feed.get_aggregate().await.cached);
        assert_eq!(quakes.calls(), 1);

        let stale = AggregateCacheEntry {
            records: Vec::new(),
            per_source_counts: BTreeMap::new(),
            fetched_at: Utc::now() - chrono::Duration::minutes(4),
        };
        cache
            .set(AGGREGATE_CACHE_KEY, &serde_json::to_string(&stale).unwrap())
            .await
            .unwrap();
        assert!(!feed.get_aggregate().await.cached);
        assert_eq!(quakes.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicates_within_a_source_are_dropped() {
        let reports = Arc::new(FakeSource::new(
            "reports",
            vec![
                record("local", "r1", RecordKind::Reports, 1),
                record("local", "r1", RecordKind::Reports, 2),
                record("other", "r1", RecordKind::Reports, 3),
            ],
        ));
        let feed = aggregator(vec![reports], Arc::new(MemoryCache::new()));

        let result = feed.get_aggregate().await;
        assert_eq!(result.count, 2);
        assert_eq!(result.sources["reports"], 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_filtered_by_kind() {
        let feed = aggregator(
            vec![
                Arc::new(FakeSource::new(
                    "earthquake",
                    vec![record("usgs", "q1", RecordKind::Earthquake, 1)],
                )),
                Arc::new(FakeSource::new(
                    "storm",
                    vec![record("met", "s1", RecordKind::Storm, 2)],
                )),
            ],
            Arc::new(MemoryCache::new()),
        );

        let storms = feed.get_aggregate().await.filtered(RecordKind::Storm);
        assert_eq!(storms.count, 1);
        assert_eq!(storms.data[0].id, "s1");
        assert_eq!(storms.sources.len(), 2);
    }

    #[test]
    fn test_cache_entry_round_trip_preserves_order() {
        let entry = AggregateCacheEntry {
            records: vec![
                record("met", "s1", RecordKind::Storm, 50),
                record("usgs", "q1", RecordKind::Earthquake, 30),
                record("local", "r1", RecordKind::Reports, 30),
            ],
            per_source_counts: BTreeMap::from([
                ("earthquake".to_string(), 1),
                ("reports".to_string(), 1),
                ("storm".to_string(), 1),
            ]),
            fetched_at: Utc::now(),
        };

        let raw = serde_json::to_string(&entry).unwrap();
        let back: AggregateCacheEntry = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, entry);
    }
}
