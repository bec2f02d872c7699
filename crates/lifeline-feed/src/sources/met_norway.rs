//! Met Norway location forecasts, reduced to storm alerts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use lifeline_shared::error::SourceError;
use lifeline_shared::types::{EmergencyRecord, RecordKind, Urgency};

use super::decode_items;
use crate::http::fetch_json;
use crate::region::City;
use crate::source::{EmergencySource, SourceReport};

pub const DEFAULT_URL: &str = "https://api.met.no/weatherapi/locationforecast/2.0/compact";
const SOURCE_NAME: &str = "Met Norway Weather Service";

/// Wind speed (m/s) above which conditions count as a storm.
pub const STORM_WIND_SPEED: f64 = 15.0;
/// Precipitation (mm) above which conditions count as a storm.
pub const STORM_PRECIPITATION: f64 = 5.0;
/// Forecast steps examined after the current one.
const FORECAST_STEPS: usize = 8;

pub struct MetNorwayStorms {
    client: Client,
    url: String,
    cities: Vec<City>,
}

impl MetNorwayStorms {
    pub fn new(client: Client, cities: Vec<City>) -> Self {
        Self {
            client,
            url: DEFAULT_URL.to_string(),
            cities,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    async fn fetch_city(&self, city: &City) -> Result<Forecast, SourceError> {
        let request = self.client.get(&self.url).query(&[
            ("lat", city.coordinates.latitude),
            ("lon", city.coordinates.longitude),
        ]);
        fetch_json(request).await
    }

    async fn fetch_records(&self) -> Result<Vec<EmergencyRecord>, SourceError> {
        let results = join_all(self.cities.iter().map(|city| async move {
            (city, self.fetch_city(city).await)
        }))
        .await;

        let mut fetched = 0usize;
        let mut records = Vec::new();
        for (city, result) in results {
            match result {
                Ok(forecast) => {
                    fetched += 1;
                    records.extend(storm_records(&city.name, forecast));
                }
                Err(e) => warn!(city = %city.name, error = %e, "Weather fetch failed"),
            }
        }

        if fetched == 0 {
            return Err(SourceError::Empty(
                "No valid weather data received".to_string(),
            ));
        }

        info!(cities = fetched, alerts = records.len(), "Storm alerts computed");
        Ok(records)
    }
}

#[async_trait]
impl EmergencySource for MetNorwayStorms {
    fn name(&self) -> &'static str {
        "storm"
    }

    async fn fetch(&self) -> SourceReport {
        SourceReport::from_result(SOURCE_NAME, self.fetch_records().await)
    }
}

#[derive(Debug, Deserialize)]
pub struct Forecast {
    pub properties: ForecastProperties,
}

#[derive(Debug, Deserialize)]
pub struct ForecastProperties {
    #[serde(default)]
    pub timeseries: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct Step {
    time: DateTime<Utc>,
    data: StepData,
}

#[derive(Debug, Deserialize)]
struct StepData {
    instant: InstantData,
    #[serde(default)]
    next_1_hours: Option<Period>,
    #[serde(default)]
    next_6_hours: Option<Period>,
}

#[derive(Debug, Deserialize)]
struct InstantData {
    details: InstantDetails,
}

#[derive(Debug, Default, Deserialize)]
struct InstantDetails {
    #[serde(default)]
    wind_speed: Option<f64>,
    #[serde(default)]
    precipitation_amount: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Period {
    #[serde(default)]
    details: Option<PeriodDetails>,
}

#[derive(Debug, Deserialize)]
struct PeriodDetails {
    #[serde(default)]
    precipitation_amount: Option<f64>,
}

fn period_precipitation(period: &Option<Period>) -> Option<f64> {
    period
        .as_ref()
        .and_then(|p| p.details.as_ref())
        .and_then(|d| d.precipitation_amount)
}

pub fn is_storm(wind_speed: f64, precipitation: f64) -> bool {
    wind_speed > STORM_WIND_SPEED || precipitation > STORM_PRECIPITATION
}

/// Storm records for one city: the current step plus the next eight.
pub fn storm_records(city: &str, forecast: Forecast) -> Vec<EmergencyRecord> {
    let steps: Vec<Step> = decode_items(SOURCE_NAME, forecast.properties.timeseries);
    let mut records = Vec::new();

    for (index, step) in steps.iter().take(FORECAST_STEPS + 1).enumerate() {
        let current = index == 0;
        let period = if current {
            &step.data.next_1_hours
        } else {
            &step.data.next_6_hours
        };

        let wind = step.data.instant.details.wind_speed.unwrap_or(0.0);
        let precipitation = step
            .data
            .instant
            .details
            .precipitation_amount
            .or_else(|| period_precipitation(period))
            .unwrap_or(0.0);

        if !is_storm(wind, precipitation) {
            continue;
        }

        let urgency = if wind > STORM_WIND_SPEED {
            Urgency::Critical
        } else {
            Urgency::High
        };
        let time = step.time.to_rfc3339();

        let (id, title, content) = if current {
            (
                format!("storm-{city}-{time}"),
                format!("Storm Alert: Strong winds in {city}"),
                format!(
                    "Storm conditions detected in {city}. Wind speed: {wind} m/s, \
                     Precipitation: {precipitation} mm. Take precautions and stay indoors if possible."
                ),
            )
        } else {
            (
                format!("storm-forecast-{city}-{time}"),
                format!("Storm Forecast: {city} - {}", step.time.format("%Y-%m-%d %H:%M UTC")),
                format!(
                    "Storm conditions forecast for {city} on {}. Expected wind speed: \
                     {wind} m/s, precipitation: {precipitation} mm.",
                    step.time.format("%a %b %d %Y")
                ),
            )
        };

        records.push(EmergencyRecord {
            id,
            title,
            content,
            source: SOURCE_NAME.to_string(),
            kind: RecordKind::Storm,
            timestamp: step.time,
            urgency,
            location: city.to_string(),
            coordinates: None,
            external_link: None,
        });
    }

    records
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(time: &str, wind: f64, next_1h: Option<f64>, next_6h: Option<f64>) -> Value {
        let mut data = serde_json::json!({
            "instant": {"details": {"wind_speed": wind, "air_temperature": 30.1}}
        });
        if let Some(p) = next_1h {
            data["next_1_hours"] = serde_json::json!({
                "summary": {"symbol_code": "heavyrain"},
                "details": {"precipitation_amount": p}
            });
        }
        if let Some(p) = next_6h {
            data["next_6_hours"] = serde_json::json!({
                "summary": {"symbol_code": "rain"},
                "details": {"precipitation_amount": p}
            });
        }
        serde_json::json!({"time": time, "data": data})
    }

    fn forecast(steps: Vec<Value>) -> Forecast {
        Forecast {
            properties: ForecastProperties { timeseries: steps },
        }
    }

    #[test]
    fn test_current_step_wind_storm_is_critical() {
        let records = storm_records(
            "Yangon",
            forecast(vec![step("2025-05-01T06:00:00Z", 17.2, Some(0.4), None)]),
        );
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "storm-Yangon-2025-05-01T06:00:00+00:00");
        assert_eq!(records[0].title, "Storm Alert: Strong winds in Yangon");
        assert_eq!(records[0].urgency, Urgency::Critical);
        assert_eq!(records[0].kind, RecordKind::Storm);
    }

    #[test]
    fn test_forecast_rain_storm_is_high() {
        let records = storm_records(
            "Bago",
            forecast(vec![
                step("2025-05-01T06:00:00Z", 3.0, Some(0.0), None),
                step("2025-05-01T12:00:00Z", 4.0, None, Some(12.5)),
            ]),
        );
        assert_eq!(records.len(), 1);
        assert!(records[0].id.starts_with("storm-forecast-Bago-"));
        assert_eq!(records[0].urgency, Urgency::High);
        assert!(records[0].content.contains("precipitation: 12.5 mm"));
    }

    #[test]
    fn test_only_nine_steps_examined() {
        let steps = (0..12)
            .map(|h| step(&format!("2025-05-01T{h:02}:00:00Z"), 20.0, None, None))
            .collect();
        assert_eq!(storm_records("Mandalay", forecast(steps)).len(), 9);
    }

    #[test]
    fn test_calm_weather_yields_nothing() {
        let records = storm_records(
            "Mawlamyine",
            forecast(vec![step("2025-05-01T06:00:00Z", 15.0, Some(5.0), None)]),
        );
        assert!(records.is_empty());
    }
}
