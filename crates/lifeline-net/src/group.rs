//! Peer group lifecycle: creation, background retry, bounded recovery,
//! discovery, sending and teardown.
//!
//! [`PeerGroupManager`] is the single owner of the session's
//! [`PeerGroupState`]. Other components read it through
//! [`state`](PeerGroupManager::state) or [`subscribe`](PeerGroupManager::subscribe).
//! Creation and recovery run under one operation lock so the background
//! retry loop and a user-triggered recovery never race on the group.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use lifeline_shared::capabilities::{Alert, AlertSink, PermissionGate, PermissionScope};
use lifeline_shared::config::Tunables;
use lifeline_shared::error::{DiscoveryError, GroupError, PeerSendError};
use lifeline_shared::types::{PeerConnectionInfo, PeerGroupState};

use crate::messages::{pump_inbound, PeerEvent, PEER_EVENT_CAPACITY};
use crate::transport::PeerTransport;

/// Result of a successful peer send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendReport {
    /// Attempts used, including the successful one.
    pub attempts: u32,
}

/// Owns the local peer group for one session, from creation to teardown.
#[derive(Clone)]
pub struct PeerGroupManager {
    inner: Arc<Inner>,
}

struct Inner {
    transport: Arc<dyn PeerTransport>,
    permissions: Arc<dyn PermissionGate>,
    alerts: Arc<dyn AlertSink>,
    tunables: Tunables,
    state: watch::Sender<PeerGroupState>,
    op_lock: tokio::sync::Mutex<()>,
    retry_task: Mutex<Option<JoinHandle<()>>>,
    inbound_task: Mutex<Option<JoinHandle<()>>>,
    torn_down: AtomicBool,
}

impl Inner {
    /// Apply `next` if it is a legal edge from the current state.
    fn transition(&self, next: PeerGroupState) -> bool {
        let mut applied = false;
        let mut rejected_from = None;

        self.state.send_if_modified(|current| {
            if *current == next {
                applied = true;
                false
            } else if current.can_transition_to(next) {
                debug!(from = %current, to = %next, "Peer group state transition");
                *current = next;
                applied = true;
                true
            } else {
                rejected_from = Some(*current);
                false
            }
        });

        if let Some(from) = rejected_from {
            warn!(from = %from, to = %next, "Illegal peer group transition ignored");
        }
        applied
    }

    fn current(&self) -> PeerGroupState {
        *self.state.borrow()
    }

    fn abort_task(slot: &Mutex<Option<JoinHandle<()>>>) -> bool {
        match slot.lock().unwrap_or_else(PoisonError::into_inner).take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        for slot in [&mut self.retry_task, &mut self.inbound_task] {
            if let Some(handle) = slot.get_mut().unwrap_or_else(PoisonError::into_inner).take() {
                handle.abort();
            }
        }

        if self.torn_down.load(Ordering::SeqCst) {
            return;
        }

        // Dropped without teardown: still release the radio group.
        let transport = Arc::clone(&self.transport);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = transport.remove_group().await {
                        warn!(error = %e, "Failed to remove peer group on drop");
                    }
                });
            }
            Err(_) => warn!("No runtime available, peer group left in place"),
        }
    }
}

impl PeerGroupManager {
    pub fn new(
        transport: Arc<dyn PeerTransport>,
        permissions: Arc<dyn PermissionGate>,
        alerts: Arc<dyn AlertSink>,
        tunables: Tunables,
    ) -> Self {
        let (state, _) = watch::channel(PeerGroupState::Uninitialized);
        Self {
            inner: Arc::new(Inner {
                transport,
                permissions,
                alerts,
                tunables,
                state,
                op_lock: tokio::sync::Mutex::new(()),
                retry_task: Mutex::new(None),
                inbound_task: Mutex::new(None),
                torn_down: AtomicBool::new(false),
            }),
        }
    }

    pub fn state(&self) -> PeerGroupState {
        self.inner.current()
    }

    /// Watch state changes.
    pub fn subscribe(&self) -> watch::Receiver<PeerGroupState> {
        self.inner.state.subscribe()
    }

    /// Whether the background retry loop is currently scheduled.
    pub fn retry_scheduled(&self) -> bool {
        self.inner
            .retry_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    pub fn is_torn_down(&self) -> bool {
        self.inner.torn_down.load(Ordering::SeqCst)
    }

    /// Bring the group up, alerting the user on radio or permission problems.
    ///
    /// A failed creation leaves the state `Failed` and schedules the
    /// background retry loop. A disabled radio never reaches the transport's
    /// `create_group`.
    pub async fn ensure_group(&self) -> Result<(), GroupError> {
        let result = self.ensure_quiet().await;
        if let Err(e) = &result {
            if !matches!(e, GroupError::Creation(_)) {
                self.alert(e);
            }
        }
        result
    }

    /// Like [`ensure_group`](Self::ensure_group) but falls back to a bounded
    /// recovery, for a total of at most `max_attempts` creations. Never alerts;
    /// the caller owns the user-facing outcome.
    pub async fn ensure_active(&self, max_attempts: u32) -> Result<(), GroupError> {
        match self.ensure_quiet().await {
            Err(GroupError::Creation(e)) if max_attempts > 1 => {
                debug!(error = %e, remaining = max_attempts - 1, "Falling back to bounded recovery");
                match self.recover_quiet(max_attempts - 1).await {
                    Err(GroupError::RetriesExhausted { attempts }) => {
                        Err(GroupError::RetriesExhausted {
                            attempts: attempts + 1,
                        })
                    }
                    other => other,
                }
            }
            Err(GroupError::Creation(_)) => {
                Inner::abort_task(&self.inner.retry_task);
                Err(GroupError::RetriesExhausted { attempts: 1 })
            }
            other => other,
        }
    }

    /// Foreground recovery: tear down any stale group and recreate it, up to
    /// `max_attempts` times with a fixed backoff. The background loop is
    /// suspended for the duration and is not re-armed on exhaustion.
    pub async fn recover_with_attempts(&self, max_attempts: u32) -> Result<(), GroupError> {
        let result = self.recover_quiet(max_attempts).await;
        if let Err(e) = &result {
            self.alert(e);
        }
        result
    }

    /// Discover peers, connect to the first one found and report the group.
    pub async fn discover_and_connect(&self) -> Result<PeerConnectionInfo, DiscoveryError> {
        let transport = &self.inner.transport;
        let tunables = &self.inner.tunables;

        transport
            .discover_peers()
            .await
            .map_err(DiscoveryError::Discovery)?;
        debug!(settle = ?tunables.discovery_settle, "Discovery started, waiting for peers");
        sleep(tunables.discovery_settle).await;

        let peers = transport.available_peers().await;
        let Some(peer) = peers.into_iter().next() else {
            warn!("No peers discovered");
            return Err(DiscoveryError::NoPeersFound);
        };

        info!(
            device = %peer.device_name,
            address = %peer.device_address,
            "Connecting to first discovered peer"
        );
        sleep(tunables.connect_settle).await;

        transport
            .connect(&peer.device_address)
            .await
            .map_err(|source| DiscoveryError::Connect {
                address: peer.device_address.clone(),
                source,
            })?;

        let info = transport
            .connection_info()
            .await
            .map_err(|source| DiscoveryError::Connect {
                address: peer.device_address.clone(),
                source,
            })?;

        if !info.group_formed {
            return Err(DiscoveryError::GroupNotFormed);
        }

        debug!(
            owner = ?info.group_owner_address,
            is_group_owner = info.is_group_owner,
            "Connected to peer group"
        );
        Ok(info)
    }

    /// Send one payload line to the group owner.
    ///
    /// A group owner never originates a send: its group is dissolved and the
    /// call fails at once without retrying.
    pub async fn send_message(
        &self,
        info: &PeerConnectionInfo,
        payload: &str,
    ) -> Result<SendReport, PeerSendError> {
        if info.is_group_owner {
            warn!("This device owns the group, dissolving it instead of sending");
            Inner::abort_task(&self.inner.retry_task);
            if let Err(e) = self.inner.transport.remove_group().await {
                warn!(error = %e, "Failed to remove own group");
            }
            self.inner.transition(PeerGroupState::Uninitialized);
            return Err(PeerSendError::GroupOwner);
        }

        if self.state() != PeerGroupState::Active {
            return Err(PeerSendError::GroupNotActive);
        }
        let host = info
            .group_owner_address
            .ok_or(PeerSendError::NoGroupOwnerAddress)?;

        let tunables = &self.inner.tunables;
        let attempts = tunables.peer_send_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self
                .inner
                .transport
                .send(host, tunables.peer_port, payload)
                .await
            {
                Ok(()) => {
                    info!(owner = %host, attempt, "SOS delivered to group owner");
                    return Ok(SendReport { attempts: attempt });
                }
                Err(e) => {
                    warn!(owner = %host, attempt, error = %e, "Peer send attempt failed");
                    last_error = e.to_string();
                }
            }

            if attempt < attempts {
                let backoff = tunables.peer_send_backoff(attempt);
                debug!(?backoff, "Backing off before next peer send");
                sleep(backoff).await;
            }
        }

        error!(attempts, "Peer send failed on every attempt");
        Err(PeerSendError::RetriesExhausted {
            attempts,
            last_error,
        })
    }

    /// Start decoding inbound transport events. Returns `None` when the
    /// transport's event stream was already taken.
    pub fn start_inbound(&self) -> Option<mpsc::Receiver<PeerEvent>> {
        let events = self.inner.transport.subscribe()?;
        let (tx, rx) = mpsc::channel(PEER_EVENT_CAPACITY);
        let handle = tokio::spawn(pump_inbound(events, tx));

        let previous = self
            .inner
            .inbound_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
        Some(rx)
    }

    /// End the session: stop every timer, wait for any creation in flight,
    /// remove the group (best effort) and return to `Uninitialized`.
    /// Idempotent; later operations fail with [`GroupError::TornDown`].
    pub async fn teardown(&self) {
        if self.inner.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }

        Inner::abort_task(&self.inner.retry_task);
        Inner::abort_task(&self.inner.inbound_task);

        // Wait out any creation in flight so it cannot outlive the removal.
        let _op = self.inner.op_lock.lock().await;
        if let Err(e) = self.inner.transport.remove_group().await {
            warn!(error = %e, "Failed to remove peer group during teardown");
        }
        self.inner.transition(PeerGroupState::Uninitialized);
        info!("Peer group manager torn down");
    }

    fn check_live(&self) -> Result<(), GroupError> {
        if self.is_torn_down() {
            Err(GroupError::TornDown)
        } else {
            Ok(())
        }
    }

    async fn ensure_quiet(&self) -> Result<(), GroupError> {
        self.check_live()?;
        let result = {
            let _op = self.inner.op_lock.lock().await;
            self.check_live()?;
            self.attempt_create().await
        };

        if matches!(result, Err(GroupError::Creation(_))) {
            self.spawn_retry_loop();
        }
        result
    }

    async fn recover_quiet(&self, max_attempts: u32) -> Result<(), GroupError> {
        self.check_live()?;
        if Inner::abort_task(&self.inner.retry_task) {
            debug!("Suspended background group retry for recovery");
        }

        let _op = self.inner.op_lock.lock().await;
        let attempts = max_attempts.max(1);

        for attempt in 1..=attempts {
            self.check_live()?;
            info!(attempt, max = attempts, "Recovering peer group");

            // Retrying is only reachable from Active or Failed.
            if matches!(
                self.state(),
                PeerGroupState::Uninitialized | PeerGroupState::Creating
            ) {
                self.inner.transition(PeerGroupState::Failed);
            }
            self.inner.transition(PeerGroupState::Retrying);

            if let Err(e) = self.inner.transport.remove_group().await {
                debug!(error = %e, "No stale group to remove");
            }

            match self.attempt_create().await {
                Ok(()) => return Ok(()),
                Err(GroupError::Creation(e)) => {
                    warn!(attempt, error = %e, "Recovery attempt failed");
                }
                Err(e) => return Err(e),
            }

            if attempt < attempts {
                sleep(self.inner.tunables.recovery_backoff).await;
            }
        }

        error!(attempts, "Peer group recovery exhausted");
        Err(GroupError::RetriesExhausted { attempts })
    }

    /// One creation attempt. Caller holds the operation lock.
    async fn attempt_create(&self) -> Result<(), GroupError> {
        let inner = &self.inner;
        match inner.current() {
            PeerGroupState::Active => return Ok(()),
            // Left over from an aborted attempt.
            PeerGroupState::Creating => {
                inner.transition(PeerGroupState::Failed);
            }
            _ => {}
        }

        if !inner.transport.is_radio_enabled().await {
            warn!("Radio disabled, not creating peer group");
            inner.transition(PeerGroupState::Failed);
            return Err(GroupError::RadioDisabled);
        }

        let denied = inner.permissions.request(PermissionScope::PeerGroup).await;
        if !denied.is_empty() {
            warn!(denied = ?denied, "Peer group permissions denied");
            inner.transition(PeerGroupState::Failed);
            return Err(GroupError::PermissionDenied(denied.join(", ")));
        }

        inner.transition(PeerGroupState::Creating);
        match inner.transport.create_group().await {
            Ok(()) if inner.torn_down.load(Ordering::SeqCst) => {
                info!("Session ended during creation, removing the new group");
                self.discard_created_group().await;
                inner.transition(PeerGroupState::Uninitialized);
                Err(GroupError::TornDown)
            }
            Ok(()) => {
                if !inner.transition(PeerGroupState::Active) {
                    warn!(state = %inner.current(), "Group created but state moved on, removing it");
                    self.discard_created_group().await;
                    return Err(GroupError::Interrupted);
                }
                info!("Peer group active");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Peer group creation failed");
                inner.transition(PeerGroupState::Failed);
                Err(GroupError::Creation(e))
            }
        }
    }

    async fn discard_created_group(&self) {
        if let Err(e) = self.inner.transport.remove_group().await {
            warn!(error = %e, "Failed to remove peer group");
        }
    }

    fn spawn_retry_loop(&self) {
        if self.is_torn_down() {
            return;
        }

        let mut slot = self
            .inner
            .retry_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }

        let weak = Arc::downgrade(&self.inner);
        let interval = self.inner.tunables.group_retry_interval;
        info!(?interval, "Scheduling background group retry");

        *slot = Some(tokio::spawn(async move {
            loop {
                sleep(interval).await;

                let Some(inner) = weak.upgrade() else { break };
                if inner.torn_down.load(Ordering::SeqCst) {
                    break;
                }
                let manager = PeerGroupManager { inner };

                let _op = manager.inner.op_lock.lock().await;
                match manager.state() {
                    PeerGroupState::Active | PeerGroupState::Uninitialized => break,
                    _ => {}
                }

                manager.inner.transition(PeerGroupState::Retrying);
                match manager.attempt_create().await {
                    Ok(()) => {
                        info!("Background retry brought the peer group up");
                        break;
                    }
                    Err(e) => debug!(error = %e, "Background group retry failed"),
                }
            }
        }));
    }

    fn alert(&self, error: &GroupError) {
        let (title, body) = match error {
            GroupError::RadioDisabled => (
                "Wi-Fi is off",
                "Turn on Wi-Fi to connect with nearby devices.".to_string(),
            ),
            GroupError::PermissionDenied(which) => (
                "Permission required",
                format!("Allow {which} to connect with nearby devices."),
            ),
            GroupError::Creation(e) => ("Could not create peer group", e.to_string()),
            GroupError::RetriesExhausted { attempts } => (
                "Could not create peer group",
                format!("Failed after {attempts} attempts. Check Wi-Fi and try again."),
            ),
            GroupError::Interrupted => ("Could not create peer group", error.to_string()),
            GroupError::TornDown => return,
        };
        self.inner.alerts.show(Alert::failure(error.kind(), title, body));
    }
}
