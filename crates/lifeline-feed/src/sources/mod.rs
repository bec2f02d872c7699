//! Source adapters, one per upstream API.

pub mod met_norway;
pub mod reports;
pub mod sos_board;
pub mod usgs;

pub use met_norway::MetNorwayStorms;
pub use reports::CommunityReports;
pub use sos_board::SosBoard;
pub use usgs::UsgsEarthquakes;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

/// Decode each item on its own so one malformed entry does not sink the
/// rest of the batch.
pub(crate) fn decode_items<T: DeserializeOwned>(source: &str, items: Vec<Value>) -> Vec<T> {
    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<T>(item) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                warn!(source, error = %e, "Skipping malformed upstream item");
                None
            }
        })
        .collect()
}
