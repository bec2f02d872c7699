//! Scripted in-memory transport and alert sink for tests.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use lifeline_shared::capabilities::{Alert, AlertSink};
use lifeline_shared::error::TransportError;
use lifeline_shared::types::{DiscoveredPeer, PeerConnectionInfo};

use crate::transport::{PeerTransport, TransportEvent};

/// One recorded call into the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimCall {
    IsRadioEnabled,
    CreateGroup,
    RemoveGroup,
    DiscoverPeers,
    AvailablePeers,
    Connect(String),
    ConnectionInfo,
    Send { host: IpAddr, port: u16, payload: String },
}

struct Script {
    radio_enabled: bool,
    create_failures: u32,
    create_always_fails: bool,
    create_delay: Duration,
    group_live: bool,
    peers: Vec<DiscoveredPeer>,
    connection_info: PeerConnectionInfo,
    send_failures: u32,
    calls: Vec<SimCall>,
}

pub struct SimTransport {
    script: Mutex<Script>,
    events_tx: mpsc::Sender<TransportEvent>,
    events_rx: Mutex<Option<mpsc::Receiver<TransportEvent>>>,
}

impl Default for SimTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl SimTransport {
    /// Radio on, group creation succeeds, no peers, and a connection as a
    /// client of `192.168.49.1`.
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::channel(64);
        Self {
            script: Mutex::new(Script {
                radio_enabled: true,
                create_failures: 0,
                create_always_fails: false,
                create_delay: Duration::ZERO,
                group_live: false,
                peers: Vec::new(),
                connection_info: PeerConnectionInfo {
                    group_formed: true,
                    is_group_owner: false,
                    group_owner_address: Some(IpAddr::V4(Ipv4Addr::new(192, 168, 49, 1))),
                },
                send_failures: 0,
                calls: Vec::new(),
            }),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
        }
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_radio_enabled(&self, enabled: bool) {
        self.script().radio_enabled = enabled;
    }

    /// Fail the next `n` group creations.
    pub fn fail_creates(&self, n: u32) {
        self.script().create_failures = n;
    }

    pub fn set_create_always_fails(&self, fails: bool) {
        self.script().create_always_fails = fails;
    }

    /// Make every group creation take `delay` before it resolves.
    pub fn set_create_delay(&self, delay: Duration) {
        self.script().create_delay = delay;
    }

    /// Whether a group created here has not been removed since.
    pub fn group_live(&self) -> bool {
        self.script().group_live
    }

    pub fn set_peers(&self, peers: Vec<DiscoveredPeer>) {
        self.script().peers = peers;
    }

    pub fn set_connection_info(&self, info: PeerConnectionInfo) {
        self.script().connection_info = info;
    }

    /// Fail the next `n` sends.
    pub fn fail_sends(&self, n: u32) {
        self.script().send_failures = n;
    }

    /// Push an event as if the radio had produced it.
    pub async fn inject(&self, event: TransportEvent) {
        let _ = self.events_tx.send(event).await;
    }

    pub fn calls(&self) -> Vec<SimCall> {
        self.script().calls.clone()
    }

    pub fn count(&self, matches: impl Fn(&SimCall) -> bool) -> usize {
        self.script().calls.iter().filter(|c| matches(c)).count()
    }

    pub fn create_group_calls(&self) -> usize {
        self.count(|c| *c == SimCall::CreateGroup)
    }

    pub fn remove_group_calls(&self) -> usize {
        self.count(|c| *c == SimCall::RemoveGroup)
    }

    pub fn send_calls(&self) -> usize {
        self.count(|c| matches!(c, SimCall::Send { .. }))
    }

    pub fn discover_calls(&self) -> usize {
        self.count(|c| *c == SimCall::DiscoverPeers)
    }

    fn record(&self, call: SimCall) {
        self.script().calls.push(call);
    }
}

#[async_trait]
impl PeerTransport for SimTransport {
    async fn is_radio_enabled(&self) -> bool {
        let mut script = self.script();
        script.calls.push(SimCall::IsRadioEnabled);
        script.radio_enabled
    }

    async fn create_group(&self) -> Result<(), TransportError> {
        let delay = {
            let mut script = self.script();
            script.calls.push(SimCall::CreateGroup);
            script.create_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut script = self.script();
        if script.create_always_fails {
            return Err(TransportError::Rejected(2));
        }
        if script.create_failures > 0 {
            script.create_failures -= 1;
            return Err(TransportError::Rejected(2));
        }
        script.group_live = true;
        Ok(())
    }

    async fn remove_group(&self) -> Result<(), TransportError> {
        let mut script = self.script();
        script.calls.push(SimCall::RemoveGroup);
        script.group_live = false;
        Ok(())
    }

    async fn discover_peers(&self) -> Result<(), TransportError> {
        self.record(SimCall::DiscoverPeers);
        Ok(())
    }

    async fn available_peers(&self) -> Vec<DiscoveredPeer> {
        let mut script = self.script();
        script.calls.push(SimCall::AvailablePeers);
        script.peers.clone()
    }

    async fn connect(&self, device_address: &str) -> Result<(), TransportError> {
        self.record(SimCall::Connect(device_address.to_string()));
        Ok(())
    }

    async fn connection_info(&self) -> Result<PeerConnectionInfo, TransportError> {
        let mut script = self.script();
        script.calls.push(SimCall::ConnectionInfo);
        Ok(script.connection_info.clone())
    }

    async fn send(&self, host: IpAddr, port: u16, payload: &str) -> Result<(), TransportError> {
        let mut script = self.script();
        script.calls.push(SimCall::Send {
            host,
            port,
            payload: payload.to_string(),
        });
        if script.send_failures > 0 {
            script.send_failures -= 1;
            return Err(TransportError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }

    fn subscribe(&self) -> Option<mpsc::Receiver<TransportEvent>> {
        self.events_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// Alert sink that keeps every alert for later inspection.
#[derive(Default)]
pub struct RecordingAlerts {
    alerts: Mutex<Vec<Alert>>,
}

impl RecordingAlerts {
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.alerts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AlertSink for RecordingAlerts {
    fn show(&self, alert: Alert) {
        self.alerts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(alert);
    }
}
