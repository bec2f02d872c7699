//! Capability interfaces for everything the core consumes from the platform.
//!
//! Implementations live at the edges (the node daemon, a mobile shell, or a
//! test double); the coordinator, peer group manager and aggregator only ever
//! see these traits.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, ErrorKind, LocationError};
use crate::types::Coordinates;

/// Reports whether the device currently has an internet path.
#[async_trait]
pub trait NetworkReachability: Send + Sync {
    async fn is_connected(&self) -> bool;
}

/// Resolves the device's current position. Callers bound it with a timeout.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn current_location(&self) -> Result<Coordinates, LocationError>;
}

/// String key-value store. Freshness is the caller's concern.
#[async_trait]
pub trait PersistentCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError>;
}

/// Platform permission gate (runtime permission prompts live outside the core).
#[async_trait]
pub trait PermissionGate: Send + Sync {
    /// Request every permission needed for `scope`. Returns the names of the
    /// permissions that were denied; an empty list means granted.
    async fn request(&self, scope: PermissionScope) -> Vec<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PermissionScope {
    Location,
    PeerGroup,
}

/// Gate that grants everything; used on hosts without runtime permissions.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl PermissionGate for AllowAll {
    async fn request(&self, _scope: PermissionScope) -> Vec<String> {
        Vec::new()
    }
}

/// Displays a local alert to the user.
pub trait AlertSink: Send + Sync {
    fn show(&self, alert: Alert);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Error,
}

/// Follow-up offered next to an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertAction {
    Retry,
    NavigateBack,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub severity: AlertSeverity,
    pub title: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<AlertAction>,
}

impl Alert {
    pub fn info(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            severity: AlertSeverity::Info,
            title: title.into(),
            body: body.into(),
            kind: None,
            actions: Vec::new(),
        }
    }

    /// A terminal failure, with a retry affordance when the kind allows one.
    pub fn failure(kind: ErrorKind, title: impl Into<String>, body: impl Into<String>) -> Self {
        let mut actions = Vec::new();
        if kind.is_retryable() {
            actions.push(AlertAction::Retry);
        }
        actions.push(AlertAction::NavigateBack);

        Self {
            severity: AlertSeverity::Error,
            title: title.into(),
            body: body.into(),
            kind: Some(kind),
            actions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_alert_actions() {
        let alert = Alert::failure(ErrorKind::RadioDisabled, "Wi-Fi is off", "Turn it on");
        assert_eq!(alert.actions, vec![AlertAction::Retry, AlertAction::NavigateBack]);

        let alert = Alert::failure(ErrorKind::PermissionDenied, "Denied", "Grant it");
        assert_eq!(alert.actions, vec![AlertAction::NavigateBack]);
    }

    #[tokio::test]
    async fn test_allow_all_grants() {
        assert!(AllowAll.request(PermissionScope::PeerGroup).await.is_empty());
    }
}
