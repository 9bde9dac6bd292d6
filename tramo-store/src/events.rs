use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, info};
use tramo_core::notify::{Notifier, NotifyError};
use tramo_shared::events::Notification;

/// In-process notification fan-out over a broadcast channel. Delivery
/// surfaces (web sockets, mail senders, webhooks) subscribe and forward;
/// with nobody subscribed the notification is simply dropped.
#[derive(Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<Notification>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl Notifier for BroadcastNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        let kind = notification.kind();
        match self.tx.send(notification) {
            Ok(receivers) => {
                info!(kind, receivers, "notification published");
                Ok(())
            }
            Err(_) => {
                debug!(kind, "no subscribers, notification dropped");
                Ok(())
            }
        }
    }
}
