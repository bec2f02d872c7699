//! Submission state of the SOS coordinator.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where the current (or last) submission is.
///
/// `Idle` is initial; `Sent` and `Failed` are terminal for one submission.
/// The next submission starts again from `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SosState {
    Idle,
    LocatingDevice,
    CheckingNetwork,
    SendingOverNetwork,
    SendingOverPeer,
    Sent,
    Failed,
}

impl SosState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Sent | Self::Failed)
    }

    pub fn is_busy(self) -> bool {
        !self.is_terminal() && self != Self::Idle
    }

    pub fn can_transition_to(self, next: SosState) -> bool {
        use SosState::*;
        match (self, next) {
            (Idle, LocatingDevice) => true,
            (LocatingDevice, CheckingNetwork) => true,
            (CheckingNetwork, SendingOverNetwork | SendingOverPeer) => true,
            (SendingOverNetwork | SendingOverPeer, Sent) => true,
            (Sent | Failed, Idle) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for SosState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::LocatingDevice => "locating_device",
            Self::CheckingNetwork => "checking_network",
            Self::SendingOverNetwork => "sending_over_network",
            Self::SendingOverPeer => "sending_over_peer",
            Self::Sent => "sent",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_to_terminal_states() {
        use SosState::*;
        assert!(Idle.can_transition_to(LocatingDevice));
        assert!(CheckingNetwork.can_transition_to(SendingOverPeer));
        assert!(SendingOverNetwork.can_transition_to(Sent));
        assert!(LocatingDevice.can_transition_to(Failed));

        assert!(!Idle.can_transition_to(Sent));
        assert!(!CheckingNetwork.can_transition_to(Sent));
        assert!(!Sent.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(LocatingDevice));
    }
}
