//! Emergency feed: source adapters and the caching aggregator.

pub mod aggregator;
pub mod http;
pub mod region;
pub mod source;
pub mod sources;

pub use aggregator::{AggregateCacheEntry, AggregateResult, FeedAggregator};
pub use region::{City, Region};
pub use source::{EmergencySource, SourceReport};
