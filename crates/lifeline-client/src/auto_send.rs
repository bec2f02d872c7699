//! Auto-send countdown.

use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::debug;

use lifeline_shared::types::SendOutcome;

use crate::coordinator::SosCoordinator;

/// Pending auto-send. Cancelled when dropped or disarmed before the deadline;
/// once the deadline has passed the submission runs to completion.
pub struct AutoSend {
    cancel: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<Option<SendOutcome>>>,
}

impl AutoSend {
    pub(crate) fn spawn(coordinator: SosCoordinator, deadline: Duration) -> Self {
        let (cancel, cancelled) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = cancelled => {
                    debug!("Auto-send disarmed");
                    None
                }
                _ = sleep(deadline) => coordinator.fire_auto_send().await,
            }
        });

        Self {
            cancel: Some(cancel),
            handle: Some(handle),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn disarm(mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }

    /// Wait for the countdown to resolve. `None` when it was skipped because
    /// the user submitted first.
    pub async fn wait(mut self) -> Option<SendOutcome> {
        let _keep_armed = self.cancel.take();
        let handle = self.handle.take()?;
        handle.await.ok().flatten()
    }
}

impl Drop for AutoSend {
    fn drop(&mut self) {
        // Dropping the sender resolves the receiver and cancels the countdown.
        if self.cancel.take().is_some() {
            debug!("Auto-send guard dropped");
        }
    }
}
