//! USGS earthquake catalogue (GeoJSON).

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use lifeline_shared::error::SourceError;
use lifeline_shared::types::{Coordinates, EmergencyRecord, RecordKind, Urgency};

use super::decode_items;
use crate::http::fetch_json;
use crate::region::Region;
use crate::source::{EmergencySource, SourceReport};

pub const DEFAULT_URL: &str = "https://earthquake.usgs.gov/fdsnws/event/1/query";
const SOURCE_NAME: &str = "USGS Earthquake Service";
const RECORD_SOURCE: &str = "USGS Earthquake Monitoring";

pub struct UsgsEarthquakes {
    client: Client,
    url: String,
    region: Region,
    min_magnitude: f64,
    window: Duration,
}

impl UsgsEarthquakes {
    /// Last 24 hours, magnitude 2.5 and above.
    pub fn new(client: Client, region: Region) -> Self {
        Self {
            client,
            url: DEFAULT_URL.to_string(),
            region,
            min_magnitude: 2.5,
            window: Duration::from_secs(24 * 60 * 60),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    async fn fetch_records(&self) -> Result<Vec<EmergencyRecord>, SourceError> {
        let end = Utc::now();
        let start = end
            - chrono::Duration::from_std(self.window)
                .map_err(|e| SourceError::Request(e.to_string()))?;

        let request = self.client.get(&self.url).query(&[
            ("format", "geojson".to_string()),
            ("starttime", start.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ("endtime", end.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ("minmagnitude", self.min_magnitude.to_string()),
            ("minlatitude", self.region.min_latitude.to_string()),
            ("maxlatitude", self.region.max_latitude.to_string()),
            ("minlongitude", self.region.min_longitude.to_string()),
            ("maxlongitude", self.region.max_longitude.to_string()),
        ]);

        let collection: FeatureCollection = fetch_json(request).await?;
        let records = map_features(collection, &self.region);
        info!(count = records.len(), "Earthquakes fetched");
        Ok(records)
    }
}

#[async_trait]
impl EmergencySource for UsgsEarthquakes {
    fn name(&self) -> &'static str {
        "earthquake"
    }

    async fn fetch(&self) -> SourceReport {
        SourceReport::from_result(SOURCE_NAME, self.fetch_records().await)
    }
}

#[derive(Debug, Deserialize)]
pub struct FeatureCollection {
    #[serde(default)]
    pub features: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    id: String,
    properties: Properties,
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct Properties {
    mag: f64,
    #[serde(default)]
    place: Option<String>,
    /// Epoch milliseconds.
    time: i64,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    /// `[lon, lat, depth_km]`
    coordinates: Vec<f64>,
}

pub fn urgency_for_magnitude(mag: f64) -> Urgency {
    if mag >= 5.0 {
        Urgency::Critical
    } else if mag >= 4.0 {
        Urgency::High
    } else {
        Urgency::Normal
    }
}

/// Normalize a GeoJSON feature collection, keeping quakes inside the region
/// or whose place names it.
pub fn map_features(collection: FeatureCollection, region: &Region) -> Vec<EmergencyRecord> {
    decode_items::<Feature>(SOURCE_NAME, collection.features)
        .into_iter()
        .filter_map(|feature| {
            let coordinates = Coordinates::from_lon_lat(&feature.geometry.coordinates)?;
            let timestamp: DateTime<Utc> = Utc.timestamp_millis_opt(feature.properties.time).single()?;
            let mag = feature.properties.mag;
            let place = feature
                .properties
                .place
                .unwrap_or_else(|| "Unknown location".to_string());
            let depth = feature
                .geometry
                .coordinates
                .get(2)
                .map(|d| format!(" at a depth of {d}km"))
                .unwrap_or_default();

            Some(EmergencyRecord {
                id: feature.id,
                title: format!("Earthquake: M {mag} - {place}"),
                content: format!("Magnitude {mag} earthquake detected {place}{depth}."),
                source: RECORD_SOURCE.to_string(),
                kind: RecordKind::Earthquake,
                timestamp,
                urgency: urgency_for_magnitude(mag),
                location: place,
                coordinates: Some(coordinates),
                external_link: feature.properties.url,
            })
        })
        .filter(|record| {
            let keep = record.coordinates.is_some_and(|c| region.contains(c))
                || region.mentions(&record.location);
            if !keep {
                debug!(id = %record.id, place = %record.location, "Earthquake outside region");
            }
            keep
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "id": "us7000pn9s",
                "properties": {"mag": 5.3, "place": "26 km NW of Sagaing, Myanmar", "time": 1743143400000, "url": "https://earthquake.usgs.gov/earthquakes/eventpage/us7000pn9s"},
                "geometry": {"type": "Point", "coordinates": [95.9, 22.0, 10.0]}
            },
            {
                "type": "Feature",
                "id": "us7000far",
                "properties": {"mag": 4.2, "place": "Eastern Burma border region", "time": 1743140000000},
                "geometry": {"type": "Point", "coordinates": [103.5, 20.0, 35.0]}
            },
            {
                "type": "Feature",
                "id": "us7000out",
                "properties": {"mag": 3.1, "place": "Northern Thailand", "time": 1743141000000},
                "geometry": {"type": "Point", "coordinates": [103.0, 30.0, 5.0]}
            },
            {
                "type": "Feature",
                "id": "broken",
                "properties": {"place": "no magnitude"},
                "geometry": {"type": "Point", "coordinates": [96.0, 20.0]}
            }
        ]
    }"#;

    #[test]
    fn test_map_features_filters_region_and_quarantines_bad_items() {
        let collection: FeatureCollection = serde_json::from_str(FIXTURE).unwrap();
        let records = map_features(collection, &Region::myanmar());

        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(first.id, "us7000pn9s");
        assert_eq!(first.title, "Earthquake: M 5.3 - 26 km NW of Sagaing, Myanmar");
        assert_eq!(
            first.content,
            "Magnitude 5.3 earthquake detected 26 km NW of Sagaing, Myanmar at a depth of 10km."
        );
        assert_eq!(first.urgency, Urgency::Critical);
        assert_eq!(first.kind, RecordKind::Earthquake);
        assert_eq!(first.coordinates, Some(Coordinates::new(22.0, 95.9)));
        assert!(first.external_link.is_some());
        assert_eq!(first.timestamp.timestamp_millis(), 1743143400000);

        // Outside the box but the place names the region.
        assert_eq!(records[1].id, "us7000far");
        assert_eq!(records[1].urgency, Urgency::High);
    }

    #[test]
    fn test_urgency_thresholds() {
        assert_eq!(urgency_for_magnitude(5.0), Urgency::Critical);
        assert_eq!(urgency_for_magnitude(4.0), Urgency::High);
        assert_eq!(urgency_for_magnitude(3.9), Urgency::Normal);
    }
}
