use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_SOS_TEXT, MAX_SOS_TEXT_CHARS};
use crate::error::{ErrorKind, FailureReason};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// GeoJSON order: `[lon, lat]`.
    pub fn to_lon_lat(self) -> [f64; 2] {
        [self.longitude, self.latitude]
    }

    pub fn from_lon_lat(pair: &[f64]) -> Option<Self> {
        match pair {
            [lon, lat, ..] if lat.is_finite() && lon.is_finite() => Some(Self::new(*lat, *lon)),
            _ => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }
}

impl std::fmt::Display for Coordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Lat: {}, Long: {}", self.latitude, self.longitude)
    }
}

/// A distress message. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SosMessage {
    text: String,
    coordinates: Option<Coordinates>,
    created_at: DateTime<Utc>,
}

impl SosMessage {
    /// Build a message, substituting the default text for an empty draft.
    ///
    /// Fails with [`ErrorKind::InvalidMessage`] when the trimmed text is longer
    /// than [`MAX_SOS_TEXT_CHARS`] characters.
    pub fn new(
        text: &str,
        coordinates: Option<Coordinates>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, FailureReason> {
        let trimmed = text.trim();
        let text = if trimmed.is_empty() {
            DEFAULT_SOS_TEXT
        } else {
            trimmed
        };

        let len = text.chars().count();
        if len > MAX_SOS_TEXT_CHARS {
            return Err(FailureReason::new(
                ErrorKind::InvalidMessage,
                format!("SOS text is {len} characters (max {MAX_SOS_TEXT_CHARS})"),
            ));
        }

        Ok(Self {
            text: text.to_string(),
            coordinates,
            created_at,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn coordinates(&self) -> Option<Coordinates> {
        self.coordinates
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Terminal result of one SOS submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SendOutcome {
    SentViaNetwork,
    SentViaPeer,
    Failed(FailureReason),
}

impl SendOutcome {
    pub fn is_sent(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        match self {
            Self::Failed(reason) => Some(reason),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerGroupState {
    Uninitialized,
    Creating,
    Active,
    Failed,
    Retrying,
}

impl PeerGroupState {
    /// Whether `self -> next` is a legal edge.
    ///
    /// `Active` is only reachable from `Creating`. Any state may fall back to
    /// `Uninitialized` (teardown, or a group owner dissolving its group).
    pub fn can_transition_to(self, next: PeerGroupState) -> bool {
        use PeerGroupState::*;
        matches!(
            (self, next),
            (Uninitialized, Creating)
                | (Uninitialized, Failed)
                | (Creating, Active)
                | (Creating, Failed)
                | (Active, Failed)
                | (Active, Retrying)
                | (Failed, Retrying)
                | (Failed, Creating)
                | (Retrying, Creating)
                | (Retrying, Failed)
                | (_, Uninitialized)
        ) && self != next
    }
}

impl std::fmt::Display for PeerGroupState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Creating => "creating",
            Self::Active => "active",
            Self::Failed => "failed",
            Self::Retrying => "retrying",
        };
        f.write_str(name)
    }
}

/// A peer seen during one discovery cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredPeer {
    pub device_name: String,
    pub device_address: String,
}

/// Group membership as reported by the transport after connecting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerConnectionInfo {
    pub group_formed: bool,
    pub is_group_owner: bool,
    pub group_owner_address: Option<IpAddr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Earthquake,
    Storm,
    Reports,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Earthquake => "earthquake",
            Self::Storm => "storm",
            Self::Reports => "reports",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Normal,
    High,
    Critical,
}

impl Urgency {
    /// Lenient parse for upstream `level` strings; unknown values are `Normal`.
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "critical" => Self::Critical,
            "high" => Self::High,
            _ => Self::Normal,
        }
    }
}

/// One normalized feed entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyRecord {
    pub id: String,
    pub title: String,
    pub content: String,
    pub source: String,
    #[serde(rename = "type")]
    pub kind: RecordKind,
    pub timestamp: DateTime<Utc>,
    pub urgency: Urgency,
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_link: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text_uses_default() {
        let msg = SosMessage::new("   ", None, Utc::now()).unwrap();
        assert_eq!(msg.text(), DEFAULT_SOS_TEXT);
    }

    #[test]
    fn test_text_limit_counts_chars() {
        // 30 multi-byte characters are fine
        let burmese = "က".repeat(30);
        assert!(SosMessage::new(&burmese, None, Utc::now()).is_ok());

        let too_long = "a".repeat(31);
        let err = SosMessage::new(&too_long, None, Utc::now()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidMessage);
    }

    #[test]
    fn test_group_state_edges() {
        use PeerGroupState::*;
        assert!(Uninitialized.can_transition_to(Creating));
        assert!(Creating.can_transition_to(Active));
        assert!(Failed.can_transition_to(Retrying));
        assert!(Retrying.can_transition_to(Creating));
        assert!(Active.can_transition_to(Uninitialized));

        assert!(!Uninitialized.can_transition_to(Active));
        assert!(!Failed.can_transition_to(Active));
        assert!(!Retrying.can_transition_to(Active));
        assert!(!Active.can_transition_to(Active));
    }

    #[test]
    fn test_coordinates_lon_lat_order() {
        let c = Coordinates::new(16.8661, 96.1951);
        assert_eq!(c.to_lon_lat(), [96.1951, 16.8661]);
        assert_eq!(Coordinates::from_lon_lat(&[96.1951, 16.8661]), Some(c));
        assert_eq!(Coordinates::from_lon_lat(&[96.1951]), None);
    }

    #[test]
    fn test_record_kind_serializes_as_type() {
        let record = EmergencyRecord {
            id: "us7000abcd".into(),
            title: "Earthquake".into(),
            content: "M 4.1".into(),
            source: "USGS".into(),
            kind: RecordKind::Earthquake,
            timestamp: Utc::now(),
            urgency: Urgency::High,
            location: "Mandalay".into(),
            coordinates: None,
            external_link: None,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "earthquake");
        assert_eq!(json["urgency"], "high");
        assert!(json.get("coordinates").is_none());
    }

    #[test]
    fn test_urgency_parse_lenient() {
        assert_eq!(Urgency::parse_lenient("CRITICAL"), Urgency::Critical);
        assert_eq!(Urgency::parse_lenient(" high "), Urgency::High);
        assert_eq!(Urgency::parse_lenient("whatever"), Urgency::Normal);
    }
}
