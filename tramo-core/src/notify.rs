//! Outbound notification port.
//!
//! Notifications fire after their transition is durable, so delivery is
//! best effort: a failed dispatch is logged and dropped, never bubbled
//! back into the operation that produced it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tramo_shared::events::Notification;

#[derive(Debug, thiserror::Error)]
#[error("notification dispatch failed: {0}")]
pub struct NotifyError(pub String);

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError>;
}

/// Send and forget. The caller's state change already committed.
pub async fn dispatch_best_effort(notifier: &dyn Notifier, notification: Notification) {
    let kind = notification.kind();
    let tenant_id = notification.tenant_id();
    if let Err(err) = notifier.notify(notification).await {
        tracing::warn!(%tenant_id, kind, error = %err, "notification dropped");
    }
}

/// Captures notifications in memory. Used by tests and by deployments that
/// have no delivery channel wired yet; `set_failing` simulates an outage.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.sent().iter().map(Notification::kind).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError("channel down".into()));
        }
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(notification);
        Ok(())
    }
}
