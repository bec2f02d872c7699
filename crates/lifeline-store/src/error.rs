use thiserror::Error;

use lifeline_shared::error::CacheError;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// No home or data directory could be resolved for this platform.
    #[error("No data directory available for the node database")]
    NoDataDir,

    #[error("Filesystem: {0}")]
    Io(#[from] std::io::Error),

    #[error("Schema step {step} failed: {reason}")]
    Migration { step: &'static str, reason: String },

    /// A stored timestamp is not valid RFC 3339.
    #[error("Bad stored timestamp: {0}")]
    ChronoParse(#[from] chrono::ParseError),

    #[error("Blocking store task did not finish: {0}")]
    Task(String),
}

impl From<StoreError> for CacheError {
    fn from(e: StoreError) -> Self {
        CacheError::Backend(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
