//! # lifeline-store
//!
//! Local storage for the Lifeline node, backed by SQLite.
//!
//! The crate exposes a synchronous [`Database`] handle wrapping a
//! `rusqlite::Connection`, with typed helpers for the key-value cache and the
//! inbound SOS inbox, plus async [`PersistentCache`] adapters for the rest of
//! the workspace.
//!
//! [`PersistentCache`]: lifeline_shared::capabilities::PersistentCache

pub mod cache;
pub mod database;
pub mod inbox;
pub mod migrations;
pub mod models;

mod error;

pub use cache::{MemoryCache, SqliteCache};
pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;
