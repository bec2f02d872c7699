//! SOS transmission coordinator.
//!
//! One submission walks `Idle -> LocatingDevice -> CheckingNetwork` and then
//! takes exactly one path: the backend when the device is online, the peer
//! group otherwise. A failed network delivery is final; the peer path is only
//! ever chosen up front. Each submission ends in one [`SendOutcome`] and one
//! alert.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use tokio::sync::{broadcast, watch};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use lifeline_net::PeerGroupManager;
use lifeline_shared::capabilities::{Alert, AlertSink, LocationProvider, NetworkReachability};
use lifeline_shared::config::Tunables;
use lifeline_shared::error::{ErrorKind, FailureReason, LocationError};
use lifeline_shared::protocol::SosEnvelope;
use lifeline_shared::types::{Coordinates, SendOutcome, SosMessage};

use crate::auto_send::AutoSend;
use crate::backend::SosDelivery;
use crate::draft::SosDraft;
use crate::events::{emit_event, ClientEvent, CLIENT_EVENT_CAPACITY};
use crate::state::SosState;

/// Drives one SOS submission at a time down the network or peer path.
#[derive(Clone)]
pub struct SosCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    reachability: Arc<dyn NetworkReachability>,
    location: Arc<dyn LocationProvider>,
    delivery: Arc<dyn SosDelivery>,
    peers: PeerGroupManager,
    alerts: Arc<dyn AlertSink>,
    tunables: Tunables,
    state: watch::Sender<SosState>,
    events: broadcast::Sender<ClientEvent>,
    draft: Mutex<SosDraft>,
    last_outcome: Mutex<Option<SendOutcome>>,
    submit_lock: tokio::sync::Mutex<()>,
    /// Set by any submission; cleared when auto-send is armed.
    submitted: AtomicBool,
}

impl SosCoordinator {
    pub fn new(
        reachability: Arc<dyn NetworkReachability>,
        location: Arc<dyn LocationProvider>,
        delivery: Arc<dyn SosDelivery>,
        peers: PeerGroupManager,
        alerts: Arc<dyn AlertSink>,
        tunables: Tunables,
    ) -> Self {
        let (state, _) = watch::channel(SosState::Idle);
        let (events, _) = broadcast::channel(CLIENT_EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                reachability,
                location,
                delivery,
                peers,
                alerts,
                tunables,
                state,
                events,
                draft: Mutex::new(SosDraft::default()),
                last_outcome: Mutex::new(None),
                submit_lock: tokio::sync::Mutex::new(()),
                submitted: AtomicBool::new(false),
            }),
        }
    }

    pub fn state(&self) -> SosState {
        *self.inner.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SosState> {
        self.inner.state.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<ClientEvent> {
        self.inner.events.subscribe()
    }

    pub fn peers(&self) -> &PeerGroupManager {
        &self.inner.peers
    }

    pub fn last_outcome(&self) -> Option<SendOutcome> {
        self.inner
            .last_outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the draft text. Returns `false` (keeping the old text) when the
    /// edit is over the length limit.
    pub fn edit_draft(&self, text: &str) -> bool {
        self.inner
            .draft
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .edit(text)
    }

    pub fn draft(&self) -> SosDraft {
        self.inner
            .draft
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Start the auto-send countdown. Dropping the returned guard cancels it.
    pub fn arm(&self) -> AutoSend {
        self.inner.submitted.store(false, Ordering::SeqCst);
        let deadline = self.inner.tunables.auto_send_deadline;
        info!(?deadline, "Auto-send armed");
        AutoSend::spawn(self.clone(), deadline)
    }

    /// Send `text` as an SOS and drive it to a terminal outcome.
    pub async fn submit(&self, text: &str) -> SendOutcome {
        self.inner.submitted.store(true, Ordering::SeqCst);
        self.run_submission(text).await
    }

    /// Send whatever the draft currently holds.
    pub async fn submit_draft(&self) -> SendOutcome {
        let text = self.draft().effective_text().to_string();
        self.submit(&text).await
    }

    /// Auto-send entry point. Skips when the user already submitted since
    /// arming.
    pub(crate) async fn fire_auto_send(&self) -> Option<SendOutcome> {
        if self.inner.submitted.swap(true, Ordering::SeqCst) {
            debug!("Auto-send deadline reached after a manual submit, skipping");
            return None;
        }

        let text = self.draft().effective_text().to_string();
        warn!("No submission before the deadline, sending SOS automatically");
        emit_event(&self.inner.events, ClientEvent::AutoSendFired);
        Some(self.run_submission(&text).await)
    }

    async fn run_submission(&self, text: &str) -> SendOutcome {
        let _guard = self.inner.submit_lock.lock().await;

        if self.state().is_terminal() {
            self.transition(SosState::Idle);
        }

        let outcome = match self.drive(text).await {
            Ok(outcome) => {
                self.transition(SosState::Sent);
                info!(?outcome, "SOS sent");
                outcome
            }
            Err(reason) => {
                self.transition(SosState::Failed);
                error!(kind = ?reason.kind, reason = %reason.message, "SOS failed");
                SendOutcome::Failed(reason)
            }
        };

        self.inner.alerts.show(alert_for(&outcome));
        *self
            .inner
            .last_outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(outcome.clone());
        emit_event(&self.inner.events, ClientEvent::SosOutcome(outcome.clone()));
        outcome
    }

    async fn drive(&self, text: &str) -> Result<SendOutcome, FailureReason> {
        let created_at = Utc::now();
        // Validate before any I/O.
        SosMessage::new(text, None, created_at)?;

        self.transition(SosState::LocatingDevice);
        let coordinates = self.locate().await?;
        let message = SosMessage::new(text, Some(coordinates), created_at)?;

        self.transition(SosState::CheckingNetwork);
        if self.inner.reachability.is_connected().await {
            self.transition(SosState::SendingOverNetwork);
            self.send_over_network(&message).await
        } else {
            self.transition(SosState::SendingOverPeer);
            self.send_over_peer(&message).await
        }
    }

    async fn locate(&self) -> Result<Coordinates, FailureReason> {
        let limit = self.inner.tunables.location_timeout;
        let result = match timeout(limit, self.inner.location.current_location()).await {
            Ok(result) => result,
            Err(_) => Err(LocationError::Timeout(limit)),
        };

        result
            .map(|coordinates| {
                debug!(%coordinates, "Device located");
                coordinates
            })
            .map_err(|e| {
                warn!(error = %e, "Location lookup failed");
                FailureReason::new(e.kind(), e.to_string())
            })
    }

    async fn send_over_network(&self, message: &SosMessage) -> Result<SendOutcome, FailureReason> {
        self.inner
            .delivery
            .deliver(message)
            .await
            .map(|()| SendOutcome::SentViaNetwork)
            .map_err(|e| FailureReason::new(e.kind(), e.to_string()))
    }

    async fn send_over_peer(&self, message: &SosMessage) -> Result<SendOutcome, FailureReason> {
        let peers = &self.inner.peers;

        peers
            .ensure_active(self.inner.tunables.group_attempts)
            .await
            .map_err(|e| FailureReason::new(e.kind(), e.to_string()))?;

        let info = peers
            .discover_and_connect()
            .await
            .map_err(|e| FailureReason::new(e.kind(), e.to_string()))?;

        let line = SosEnvelope::from_message(message)
            .to_line()
            .map_err(|e| FailureReason::new(ErrorKind::InvalidMessage, e.to_string()))?;

        let report = peers
            .send_message(&info, &line)
            .await
            .map_err(|e| FailureReason::new(e.kind(), e.to_string()))?;
        debug!(attempts = report.attempts, "Peer send finished");

        Ok(SendOutcome::SentViaPeer)
    }

    fn transition(&self, next: SosState) {
        let mut changed = false;
        self.inner.state.send_if_modified(|current| {
            if *current != next && current.can_transition_to(next) {
                debug!(from = %current, to = %next, "SOS state transition");
                *current = next;
                changed = true;
            }
            changed
        });

        if changed {
            emit_event(&self.inner.events, ClientEvent::SosStateChanged(next));
        } else if self.state() != next {
            warn!(from = %self.state(), to = %next, "Illegal SOS transition ignored");
        }
    }
}

fn alert_for(outcome: &SendOutcome) -> Alert {
    match outcome {
        SendOutcome::SentViaNetwork => Alert::info(
            "SOS Sent",
            "Your SOS has been delivered. Help is being notified.",
        ),
        SendOutcome::SentViaPeer => Alert::info(
            "SOS Sent",
            "No internet. Your SOS was passed to a nearby device.",
        ),
        SendOutcome::Failed(reason) => {
            let title = match reason.kind {
                ErrorKind::PermissionDenied => "Permission required",
                ErrorKind::RadioDisabled => "Wi-Fi is off",
                ErrorKind::LocationUnavailable => "Location unavailable",
                ErrorKind::NetworkTransportError => "Could not send SOS",
                ErrorKind::PeerDiscoveryEmpty => "No nearby devices",
                ErrorKind::PeerConnectionError => "Could not reach nearby device",
                ErrorKind::GroupCreationError => "Could not create peer group",
                ErrorKind::InvalidMessage => "Invalid message",
                _ => "SOS failed",
            };
            Alert::failure(reason.kind, title, reason.message.clone())
        }
    }
}
