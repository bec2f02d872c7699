use serde::Serialize;
use tokio::sync::broadcast;

use lifeline_shared::types::SendOutcome;

use crate::state::SosState;

pub const EVENT_SOS_STATE_CHANGED: &str = "sos-state-changed";
pub const EVENT_SOS_OUTCOME: &str = "sos-outcome";
pub const EVENT_AUTO_SEND_FIRED: &str = "auto-send-fired";

pub const CLIENT_EVENT_CAPACITY: usize = 64;

/// Events pushed to whatever UI shell is attached to the client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case")]
pub enum ClientEvent {
    SosStateChanged(SosState),
    SosOutcome(SendOutcome),
    AutoSendFired,
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SosStateChanged(_) => EVENT_SOS_STATE_CHANGED,
            Self::SosOutcome(_) => EVENT_SOS_OUTCOME,
            Self::AutoSendFired => EVENT_AUTO_SEND_FIRED,
        }
    }
}

pub fn emit_event(tx: &broadcast::Sender<ClientEvent>, event: ClientEvent) {
    let name = event.name();
    if tx.send(event).is_err() {
        tracing::trace!(event = name, "No event subscribers");
    }
}
