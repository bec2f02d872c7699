//! Node configuration loaded from environment variables.
//!
//! All settings have defaults so the node starts with zero configuration on a
//! development machine. Timing and retry knobs live in [`Tunables`] and are
//! read separately.
//!
//! [`Tunables`]: lifeline_shared::config::Tunables

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use lifeline_shared::constants::{DEFAULT_BACKEND_URL, DEFAULT_HTTP_PORT};
use lifeline_shared::types::Coordinates;

#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Local HTTP API for the UI shell.
    /// Env: `LIFELINE_HTTP_ADDR`
    /// Default: `127.0.0.1:8080`
    pub http_addr: SocketAddr,

    /// Rescue backend root (SOS submission, notifications, reports, SOS board).
    /// Env: `LIFELINE_BACKEND_URL`
    pub backend_url: String,

    /// SQLite file. `None` uses the platform data directory.
    /// Env: `LIFELINE_DB_PATH`
    pub db_path: Option<PathBuf>,

    /// Static peer list (`name ip` per line) used for discovery.
    /// Env: `LIFELINE_PEERS_FILE`
    pub peers_path: Option<PathBuf>,

    /// Fixed device position reported by the location provider.
    /// Env: `LIFELINE_LATITUDE` and `LIFELINE_LONGITUDE` (both required)
    pub device_location: Option<Coordinates>,

    /// Host the peer group and receive SOS envelopes instead of sending them.
    /// Env: `LIFELINE_HOST_GROUP` (true/false)
    /// Default: `false`
    pub host_group: bool,

    /// Feed region. Only `myanmar` is built in.
    /// Env: `LIFELINE_REGION`
    pub region: String,

    /// How often the feed is refreshed in the background.
    /// Env: `LIFELINE_FEED_REFRESH_SECS`
    /// Default: `180`
    pub feed_refresh_interval: Duration,

    /// Timeout for one backend HTTP request.
    /// Env: `LIFELINE_HTTP_TIMEOUT_SECS`
    /// Default: `10`
    pub http_timeout: Duration,

    /// How many alerts the local inbox keeps.
    /// Env: `LIFELINE_ALERT_HISTORY`
    /// Default: `100`
    pub alert_history: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            http_addr: ([127, 0, 0, 1], DEFAULT_HTTP_PORT).into(),
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            db_path: None,
            peers_path: None,
            device_location: None,
            host_group: false,
            region: "myanmar".to_string(),
            feed_refresh_interval: Duration::from_secs(180),
            http_timeout: Duration::from_secs(10),
            alert_history: 100,
        }
    }
}

impl NodeConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Unparsable values are logged
    /// and the default is kept.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = lookup("LIFELINE_HTTP_ADDR") {
            match addr.parse::<SocketAddr>() {
                Ok(parsed) => config.http_addr = parsed,
                Err(_) => tracing::warn!(value = %addr, "Invalid LIFELINE_HTTP_ADDR, using default"),
            }
        }

        if let Some(url) = lookup("LIFELINE_BACKEND_URL") {
            if !url.trim().is_empty() {
                config.backend_url = url.trim().trim_end_matches('/').to_string();
            }
        }

        if let Some(path) = lookup("LIFELINE_DB_PATH") {
            config.db_path = Some(PathBuf::from(path));
        }

        if let Some(path) = lookup("LIFELINE_PEERS_FILE") {
            config.peers_path = Some(PathBuf::from(path));
        }

        match (lookup("LIFELINE_LATITUDE"), lookup("LIFELINE_LONGITUDE")) {
            (Some(lat), Some(lon)) => match (lat.parse::<f64>(), lon.parse::<f64>()) {
                (Ok(lat), Ok(lon)) if Coordinates::new(lat, lon).is_valid() => {
                    config.device_location = Some(Coordinates::new(lat, lon));
                }
                _ => tracing::warn!(%lat, %lon, "Invalid device coordinates, location disabled"),
            },
            (None, None) => {}
            _ => tracing::warn!("Set both LIFELINE_LATITUDE and LIFELINE_LONGITUDE"),
        }

        if let Some(val) = lookup("LIFELINE_HOST_GROUP") {
            config.host_group = val == "true" || val == "1";
        }

        if let Some(region) = lookup("LIFELINE_REGION") {
            config.region = region.trim().to_lowercase();
        }

        if let Some(val) = lookup("LIFELINE_FEED_REFRESH_SECS") {
            match val.parse::<u64>() {
                Ok(secs) if secs > 0 => config.feed_refresh_interval = Duration::from_secs(secs),
                _ => tracing::warn!(value = %val, "Invalid LIFELINE_FEED_REFRESH_SECS, using default"),
            }
        }

        if let Some(val) = lookup("LIFELINE_HTTP_TIMEOUT_SECS") {
            match val.parse::<u64>() {
                Ok(secs) if secs > 0 => config.http_timeout = Duration::from_secs(secs),
                _ => tracing::warn!(value = %val, "Invalid LIFELINE_HTTP_TIMEOUT_SECS, using default"),
            }
        }

        if let Some(val) = lookup("LIFELINE_ALERT_HISTORY") {
            if let Ok(n) = val.parse::<usize>() {
                config.alert_history = n.max(1);
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> NodeConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        NodeConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = NodeConfig::default();
        assert_eq!(config.http_addr, SocketAddr::from(([127, 0, 0, 1], 8080)));
        assert_eq!(config.backend_url, DEFAULT_BACKEND_URL);
        assert!(!config.host_group);
        assert!(config.device_location.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = from_pairs(&[
            ("LIFELINE_HTTP_ADDR", "0.0.0.0:9000"),
            ("LIFELINE_BACKEND_URL", "http://localhost:3000/"),
            ("LIFELINE_LATITUDE", "16.8661"),
            ("LIFELINE_LONGITUDE", "96.1951"),
            ("LIFELINE_HOST_GROUP", "true"),
        ]);
        assert_eq!(config.http_addr, SocketAddr::from(([0, 0, 0, 0], 9000)));
        assert_eq!(config.backend_url, "http://localhost:3000");
        assert_eq!(config.device_location, Some(Coordinates::new(16.8661, 96.1951)));
        assert!(config.host_group);
    }

    #[test]
    fn test_bad_values_keep_defaults() {
        let config = from_pairs(&[
            ("LIFELINE_HTTP_ADDR", "nowhere"),
            ("LIFELINE_LATITUDE", "95.0"),
            ("LIFELINE_LONGITUDE", "10.0"),
            ("LIFELINE_FEED_REFRESH_SECS", "0"),
        ]);
        assert_eq!(config.http_addr, NodeConfig::default().http_addr);
        assert!(config.device_location.is_none());
        assert_eq!(config.feed_refresh_interval, Duration::from_secs(180));
    }
}
