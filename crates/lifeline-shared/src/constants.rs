/// Application name
pub const APP_NAME: &str = "Lifeline";

/// Maximum SOS text length in characters
pub const MAX_SOS_TEXT_CHARS: usize = 30;

/// Text sent when the user leaves the draft empty
pub const DEFAULT_SOS_TEXT: &str = "HELP ME!";

/// TCP port the group owner listens on for SOS envelopes
pub const DEFAULT_PEER_PORT: u16 = 8888;

/// Maximum size of one newline-delimited wire envelope (16 KiB)
pub const MAX_ENVELOPE_SIZE: usize = 16 * 1024;

/// Cache key holding the serialized aggregate feed
pub const AGGREGATE_CACHE_KEY: &str = "EMERGENCY_FEED_CACHE";

/// Cache key holding the news-report submission history
pub const REPORT_HISTORY_CACHE_KEY: &str = "REPORT_SUBMISSION_HISTORY";

/// Default HTTP API port of the node daemon
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Default backend base URL for SOS delivery and report submission
pub const DEFAULT_BACKEND_URL: &str = "https://sos-mm.fly.dev";

/// User-Agent sent to upstream feeds (Met Norway rejects anonymous clients)
pub const USER_AGENT: &str = concat!("LifelineNode/", env!("CARGO_PKG_VERSION"));

/// News reports: maximum words per report
pub const MAX_REPORT_WORDS: usize = 100;

/// News reports: maximum submissions per window
pub const MAX_REPORTS_PER_WINDOW: usize = 5;

/// News reports: sliding window length in seconds
pub const REPORT_WINDOW_SECS: i64 = 60;
