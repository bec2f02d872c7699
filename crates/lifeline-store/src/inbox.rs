//! Inbound SOS inbox.

use chrono::{DateTime, Utc};
use rusqlite::params;

use lifeline_shared::protocol::ReceivedSos;
use lifeline_shared::types::Coordinates;

use crate::database::Database;
use crate::error::Result;
use crate::models::InboxEntry;

impl Database {
    /// Store a received SOS and return its row id.
    pub fn record_inbound_sos(&self, sos: &ReceivedSos, received_at: DateTime<Utc>) -> Result<i64> {
        self.conn().execute(
            "INSERT INTO inbound_sos (message, latitude, longitude, sent_at, received_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                sos.message,
                sos.coordinates.map(|c| c.latitude),
                sos.coordinates.map(|c| c.longitude),
                sos.timestamp.map(|t| t.to_rfc3339()),
                received_at.to_rfc3339(),
            ],
        )?;
        Ok(self.conn().last_insert_rowid())
    }

    /// Most recent entries first.
    pub fn list_inbound_sos(&self, limit: u32) -> Result<Vec<InboxEntry>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, message, latitude, longitude, sent_at, received_at
             FROM inbound_sos
             ORDER BY received_at DESC, id DESC
             LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![limit], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<f64>>(2)?,
                row.get::<_, Option<f64>>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (id, message, lat, lon, sent_at, received_at) = row?;
            entries.push(InboxEntry {
                id,
                message,
                coordinates: lat.zip(lon).map(|(lat, lon)| Coordinates::new(lat, lon)),
                sent_at: sent_at
                    .as_deref()
                    .map(DateTime::parse_from_rfc3339)
                    .transpose()?
                    .map(|dt| dt.with_timezone(&Utc)),
                received_at: DateTime::parse_from_rfc3339(&received_at)?.with_timezone(&Utc),
            });
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_inbox_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("inbox.db")).unwrap();
        let now = Utc::now();

        let first = ReceivedSos {
            message: "HELP ME!".into(),
            coordinates: Some(Coordinates::new(16.8661, 96.1951)),
            timestamp: Some(now - Duration::minutes(5)),
        };
        let second = ReceivedSos {
            message: "Trapped".into(),
            coordinates: None,
            timestamp: None,
        };
        db.record_inbound_sos(&first, now - Duration::minutes(1)).unwrap();
        db.record_inbound_sos(&second, now).unwrap();

        let entries = db.list_inbound_sos(10).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message, "Trapped");
        assert_eq!(entries[0].coordinates, None);
        assert_eq!(entries[1].coordinates, Some(Coordinates::new(16.8661, 96.1951)));
        assert!(entries[1].sent_at.is_some());

        assert_eq!(db.list_inbound_sos(1).unwrap().len(), 1);
    }
}
