//! Records persisted in the local database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lifeline_shared::types::Coordinates;

/// An SOS received from a peer while hosting the group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InboxEntry {
    /// Row id, assigned on insert.
    pub id: i64,
    pub message: String,
    pub coordinates: Option<Coordinates>,
    /// Timestamp carried by the envelope, when it parsed.
    pub sent_at: Option<DateTime<Utc>>,
    /// Local receive time.
    pub received_at: DateTime<Utc>,
}
