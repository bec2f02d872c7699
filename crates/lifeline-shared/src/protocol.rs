use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::MAX_ENVELOPE_SIZE;
use crate::error::EnvelopeError;
use crate::types::{Coordinates, SosMessage};

/// GeoJSON point, `[lon, lat]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    #[serde(rename = "type", default = "GeoPoint::point_type")]
    pub kind: String,
    pub coordinates: Vec<f64>,
}

impl GeoPoint {
    fn point_type() -> String {
        "Point".to_string()
    }

    pub fn from_coordinates(coordinates: Coordinates) -> Self {
        Self {
            kind: Self::point_type(),
            coordinates: coordinates.to_lon_lat().to_vec(),
        }
    }
}

/// The SOS envelope shared by the HTTP submission endpoint and the peer wire
/// protocol (one JSON object per line on the peer port).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SosEnvelope {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<GeoPoint>,
    #[serde(default)]
    pub timestamp: String,
}

impl SosEnvelope {
    pub fn from_message(message: &SosMessage) -> Self {
        Self {
            message: message.text().to_string(),
            coordinates: message.coordinates().map(GeoPoint::from_coordinates),
            timestamp: message
                .created_at()
                .to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    /// Encode as a single line (no trailing newline).
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode one received line, validating size and content.
    pub fn decode(raw: &str) -> Result<ReceivedSos, EnvelopeError> {
        if raw.len() > MAX_ENVELOPE_SIZE {
            return Err(EnvelopeError::TooLarge {
                size: raw.len(),
                max: MAX_ENVELOPE_SIZE,
            });
        }

        let envelope: SosEnvelope = serde_json::from_str(raw.trim())?;
        let message = envelope.message.trim();
        if message.is_empty() {
            return Err(EnvelopeError::EmptyMessage);
        }

        let coordinates = envelope
            .coordinates
            .as_ref()
            .and_then(|point| Coordinates::from_lon_lat(&point.coordinates))
            .filter(Coordinates::is_valid);

        // A bad timestamp is not worth dropping an SOS over.
        let timestamp = DateTime::parse_from_rfc3339(&envelope.timestamp)
            .ok()
            .map(|dt| dt.with_timezone(&Utc));

        Ok(ReceivedSos {
            message: message.to_string(),
            coordinates,
            timestamp,
        })
    }
}

/// An SOS decoded from the peer wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceivedSos {
    pub message: String,
    pub coordinates: Option<Coordinates>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Out-of-band notification fired after a successful network submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SosNotification {
    pub title: String,
    pub body: String,
}

impl SosNotification {
    pub fn for_message(message: &SosMessage) -> Self {
        let location = message
            .coordinates()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        Self {
            title: message.text().to_string(),
            body: format!("SOS! I need help.\nLocation: {location}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EnvelopeError;

    fn sample_message() -> SosMessage {
        SosMessage::new(
            "Trapped on 3rd floor",
            Some(Coordinates::new(21.9588, 96.0891)),
            "2025-03-28T06:30:00Z".parse().unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_envelope_wire_shape() {
        let envelope = SosEnvelope::from_message(&sample_message());
        let json: serde_json::Value = serde_json::from_str(&envelope.to_line().unwrap()).unwrap();

        assert_eq!(json["message"], "Trapped on 3rd floor");
        assert_eq!(json["coordinates"]["type"], "Point");
        assert_eq!(json["coordinates"]["coordinates"][0], 96.0891);
        assert_eq!(json["coordinates"]["coordinates"][1], 21.9588);
        assert_eq!(json["timestamp"], "2025-03-28T06:30:00.000Z");
    }

    #[test]
    fn test_decode_without_point_type() {
        let raw = r#"{"message":"HELP ME!","coordinates":{"coordinates":[96.1951,16.8661]},"timestamp":"2025-03-28T06:30:00.000Z"}"#;
        let received = SosEnvelope::decode(raw).unwrap();
        assert_eq!(received.message, "HELP ME!");
        assert_eq!(received.coordinates, Some(Coordinates::new(16.8661, 96.1951)));
        assert!(received.timestamp.is_some());
    }

    #[test]
    fn test_decode_tolerates_bad_timestamp_and_coordinates() {
        let raw = r#"{"message":"HELP","coordinates":{"coordinates":[500.0,16.0]},"timestamp":"yesterday"}"#;
        let received = SosEnvelope::decode(raw).unwrap();
        assert_eq!(received.coordinates, None);
        assert_eq!(received.timestamp, None);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            SosEnvelope::decode("not json"),
            Err(EnvelopeError::Json(_))
        ));
        assert!(matches!(
            SosEnvelope::decode(r#"{"message":"   "}"#),
            Err(EnvelopeError::EmptyMessage)
        ));
        let huge = format!(r#"{{"message":"{}"}}"#, "x".repeat(MAX_ENVELOPE_SIZE));
        assert!(matches!(
            SosEnvelope::decode(&huge),
            Err(EnvelopeError::TooLarge { .. })
        ));
    }

    #[test]
    fn test_notification_body_has_location() {
        let note = SosNotification::for_message(&sample_message());
        assert_eq!(note.title, "Trapped on 3rd floor");
        assert!(note.body.contains("Lat: 21.9588, Long: 96.0891"));
    }
}
