//! Timing and retry tunables.
//!
//! Every delay, timeout and attempt count used by the coordinator, the peer
//! group manager and the feed aggregator lives here so deployments can tune
//! them without touching logic. Values can be overridden from environment
//! variables (milliseconds for durations, plain integers for counts).

use std::time::Duration;

use tracing::warn;

use crate::constants::DEFAULT_PEER_PORT;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tunables {
    /// Per-source fetch deadline in the aggregator.
    /// Env: `LIFELINE_SOURCE_TIMEOUT_MS`
    pub source_timeout: Duration,

    /// Maximum age of a cached aggregate.
    /// Env: `LIFELINE_CACHE_TTL_MS`
    pub cache_ttl: Duration,

    /// Delay after arming before the SOS is sent automatically.
    /// Env: `LIFELINE_AUTO_SEND_MS`
    pub auto_send_deadline: Duration,

    /// Bound on location resolution.
    /// Env: `LIFELINE_LOCATION_TIMEOUT_MS`
    pub location_timeout: Duration,

    /// Period of the background group-creation retry loop.
    /// Env: `LIFELINE_GROUP_RETRY_INTERVAL_MS`
    pub group_retry_interval: Duration,

    /// Attempts made by a user-triggered group recovery.
    /// Env: `LIFELINE_RECOVERY_ATTEMPTS`
    pub recovery_attempts: u32,

    /// Pause between recovery attempts.
    /// Env: `LIFELINE_RECOVERY_BACKOFF_MS`
    pub recovery_backoff: Duration,

    /// Attempts the coordinator allows for bringing a group up before
    /// giving up on the peer path.
    /// Env: `LIFELINE_GROUP_ATTEMPTS`
    pub group_attempts: u32,

    /// Attempts made by a peer send.
    /// Env: `LIFELINE_PEER_SEND_ATTEMPTS`
    pub peer_send_attempts: u32,

    /// Backoff after the first failed peer send; grows linearly per attempt.
    /// Env: `LIFELINE_PEER_SEND_BACKOFF_MIN_MS`
    pub peer_send_backoff_min: Duration,

    /// Upper bound on the peer send backoff.
    /// Env: `LIFELINE_PEER_SEND_BACKOFF_MAX_MS`
    pub peer_send_backoff_max: Duration,

    /// Wait after starting discovery; peers report themselves asynchronously.
    /// Env: `LIFELINE_DISCOVERY_SETTLE_MS`
    pub discovery_settle: Duration,

    /// Wait between picking a peer and connecting to it.
    /// Env: `LIFELINE_CONNECT_SETTLE_MS`
    pub connect_settle: Duration,

    /// TCP connect timeout for the peer wire.
    /// Env: `LIFELINE_PEER_CONNECT_TIMEOUT_MS`
    pub peer_connect_timeout: Duration,

    /// Port the group owner listens on.
    /// Env: `LIFELINE_PEER_PORT`
    pub peer_port: u16,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            source_timeout: Duration::from_secs(5),
            cache_ttl: Duration::from_secs(3 * 60),
            auto_send_deadline: Duration::from_secs(30),
            location_timeout: Duration::from_secs(15),
            group_retry_interval: Duration::from_secs(10),
            recovery_attempts: 3,
            recovery_backoff: Duration::from_secs(2),
            group_attempts: 3,
            peer_send_attempts: 3,
            peer_send_backoff_min: Duration::from_secs(2),
            peer_send_backoff_max: Duration::from_secs(4),
            discovery_settle: Duration::from_secs(4),
            connect_settle: Duration::from_secs(2),
            peer_connect_timeout: Duration::from_secs(5),
            peer_port: DEFAULT_PEER_PORT,
        }
    }
}

impl Tunables {
    /// Load tunables from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but with an injectable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut t = Self::default();

        override_millis(&lookup, "LIFELINE_SOURCE_TIMEOUT_MS", &mut t.source_timeout);
        override_millis(&lookup, "LIFELINE_CACHE_TTL_MS", &mut t.cache_ttl);
        override_millis(&lookup, "LIFELINE_AUTO_SEND_MS", &mut t.auto_send_deadline);
        override_millis(&lookup, "LIFELINE_LOCATION_TIMEOUT_MS", &mut t.location_timeout);
        override_millis(
            &lookup,
            "LIFELINE_GROUP_RETRY_INTERVAL_MS",
            &mut t.group_retry_interval,
        );
        override_count(&lookup, "LIFELINE_RECOVERY_ATTEMPTS", &mut t.recovery_attempts);
        override_millis(&lookup, "LIFELINE_RECOVERY_BACKOFF_MS", &mut t.recovery_backoff);
        override_count(&lookup, "LIFELINE_GROUP_ATTEMPTS", &mut t.group_attempts);
        override_count(&lookup, "LIFELINE_PEER_SEND_ATTEMPTS", &mut t.peer_send_attempts);
        override_millis(
            &lookup,
            "LIFELINE_PEER_SEND_BACKOFF_MIN_MS",
            &mut t.peer_send_backoff_min,
        );
        override_millis(
            &lookup,
            "LIFELINE_PEER_SEND_BACKOFF_MAX_MS",
            &mut t.peer_send_backoff_max,
        );
        override_millis(&lookup, "LIFELINE_DISCOVERY_SETTLE_MS", &mut t.discovery_settle);
        override_millis(&lookup, "LIFELINE_CONNECT_SETTLE_MS", &mut t.connect_settle);
        override_millis(
            &lookup,
            "LIFELINE_PEER_CONNECT_TIMEOUT_MS",
            &mut t.peer_connect_timeout,
        );

        if let Some(raw) = lookup("LIFELINE_PEER_PORT") {
            match raw.trim().parse::<u16>() {
                Ok(port) if port != 0 => t.peer_port = port,
                _ => warn!(value = %raw, "Invalid LIFELINE_PEER_PORT, using default"),
            }
        }

        if t.peer_send_backoff_max < t.peer_send_backoff_min {
            warn!("Peer send backoff max below min, clamping to min");
            t.peer_send_backoff_max = t.peer_send_backoff_min;
        }

        t
    }

    /// Backoff to sleep after failed peer send attempt `attempt` (1-based):
    /// `min * attempt`, capped at `max`. With defaults: 2s, then 4s.
    pub fn peer_send_backoff(&self, attempt: u32) -> Duration {
        self.peer_send_backoff_min
            .saturating_mul(attempt.max(1))
            .min(self.peer_send_backoff_max)
    }
}

fn override_millis<F>(lookup: &F, key: &str, slot: &mut Duration)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(key) {
        match raw.trim().parse::<u64>() {
            Ok(ms) => *slot = Duration::from_millis(ms),
            Err(e) => warn!(key, value = %raw, error = %e, "Invalid duration, using default"),
        }
    }
}

fn override_count<F>(lookup: &F, key: &str, slot: &mut u32)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(key) {
        match raw.trim().parse::<u32>() {
            Ok(n) if n > 0 => *slot = n,
            _ => warn!(key, value = %raw, "Invalid count, using default"),
        }
    }
}
