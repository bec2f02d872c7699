//! Schema versioning for the node database.
//!
//! `PRAGMA user_version` records the last applied step; each step runs inside
//! its own transaction together with the version bump.

pub mod v001_cache;
pub mod v002_inbox;

use rusqlite::Connection;

use crate::error::{Result, StoreError};

type Step = fn(&Connection) -> rusqlite::Result<()>;

const STEPS: &[(&str, Step)] = &[
    ("v001_cache", v001_cache::up),
    ("v002_inbox", v002_inbox::up),
];

/// Schema version after every step has been applied.
pub const CURRENT_VERSION: u32 = STEPS.len() as u32;

pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    let applied: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    if applied >= CURRENT_VERSION {
        tracing::debug!(version = applied, "schema up to date");
        return Ok(());
    }

    for (index, (name, up)) in STEPS.iter().enumerate().skip(applied as usize) {
        let version = index as u32 + 1;
        tracing::info!(step = *name, version, "migrating schema");

        let tx = conn.transaction()?;
        up(&*tx).map_err(|e| StoreError::Migration {
            step: *name,
            reason: e.to_string(),
        })?;
        tx.pragma_update(None, "user_version", version)?;
        tx.commit()?;
    }

    Ok(())
}
