//! v002 -- Inbound SOS inbox for hosting nodes.

use rusqlite::Connection;

const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS inbound_sos (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    message     TEXT NOT NULL,
    latitude    REAL,
    longitude   REAL,
    sent_at     TEXT,                      -- RFC-3339, as carried by the envelope
    received_at TEXT NOT NULL              -- RFC-3339, local clock
);

CREATE INDEX IF NOT EXISTS idx_inbound_sos_received_at ON inbound_sos(received_at);
"#;

pub fn up(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(UP_SQL)
}
