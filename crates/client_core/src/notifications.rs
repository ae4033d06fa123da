use std::sync::Arc;

use async_trait::async_trait;
use shared::{
    domain::NotificationId,
    protocol::{Notification, SocketEvent},
};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use crate::transport::TransportError;

pub const NOTIFICATION_EVENT: &str = "notification";

#[async_trait]
pub trait NotificationApi: Send + Sync {
    async fn fetch_notifications(&self) -> Result<Vec<Notification>, TransportError>;
    async fn mark_notification_read(&self, id: &NotificationId) -> Result<(), TransportError>;
    async fn mark_all_notifications_read(&self) -> Result<(), TransportError>;
    async fn delete_notification(&self, id: &NotificationId) -> Result<(), TransportError>;
    async fn clear_all_notifications(&self) -> Result<(), TransportError>;
}

/// Notifications received this session, newest first.
pub struct NotificationCenter {
    items: RwLock<Vec<Notification>>,
    events: broadcast::Sender<Notification>,
}

impl NotificationCenter {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            items: RwLock::new(Vec::new()),
            events,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.events.subscribe()
    }

    /// Handles one realtime frame. Returns the notification it carried, if
    /// any.
    pub async fn ingest(&self, event: SocketEvent) -> Option<Notification> {
        if event.event != NOTIFICATION_EVENT {
            debug!(event = %event.event, "ignoring socket event");
            return None;
        }
        match serde_json::from_value::<Notification>(event.data) {
            Ok(notification) => {
                self.push(notification.clone()).await;
                Some(notification)
            }
            Err(err) => {
                warn!(error = %err, "dropping malformed notification");
                None
            }
        }
    }

    pub async fn ingest_json(&self, raw: &str) -> Option<Notification> {
        match serde_json::from_str::<SocketEvent>(raw) {
            Ok(event) => self.ingest(event).await,
            Err(err) => {
                warn!(error = %err, "dropping malformed socket frame");
                None
            }
        }
    }

    /// Puts `notification` at the front, replacing an entry with the same id.
    pub async fn push(&self, notification: Notification) {
        {
            let mut items = self.items.write().await;
            items.retain(|existing| existing.id != notification.id);
            items.insert(0, notification.clone());
        }
        info!(notification_id = %notification.id, kind = ?notification.kind, "notification received");
        // No subscribers is fine.
        let _ = self.events.send(notification);
    }

    pub async fn replace_all(&self, notifications: Vec<Notification>) {
        *self.items.write().await = notifications;
    }

    pub async fn list(&self) -> Vec<Notification> {
        self.items.read().await.clone()
    }

    pub async fn unread_count(&self) -> usize {
        self.items.read().await.iter().filter(|n| !n.read).count()
    }

    pub async fn mark_read(&self, id: &NotificationId) -> bool {
        let mut items = self.items.write().await;
        match items.iter_mut().find(|n| &n.id == id) {
            Some(notification) => {
                notification.read = true;
                true
            }
            None => false,
        }
    }

    /// Returns how many entries changed.
    pub async fn mark_all_read(&self) -> usize {
        let mut items = self.items.write().await;
        let mut changed = 0;
        for notification in items.iter_mut().filter(|n| !n.read) {
            notification.read = true;
            changed += 1;
        }
        changed
    }

    pub async fn remove(&self, id: &NotificationId) -> bool {
        let mut items = self.items.write().await;
        let before = items.len();
        items.retain(|n| &n.id != id);
        items.len() != before
    }

    pub async fn clear(&self) {
        self.items.write().await.clear();
    }

    /// Loads the server's list, replacing local state.
    pub async fn sync(&self, api: &dyn NotificationApi) -> Result<usize, TransportError> {
        let notifications = api.fetch_notifications().await?;
        let count = notifications.len();
        self.replace_all(notifications).await;
        Ok(count)
    }

    pub async fn sync_mark_read(
        &self,
        api: &dyn NotificationApi,
        id: &NotificationId,
    ) -> Result<bool, TransportError> {
        api.mark_notification_read(id).await?;
        Ok(self.mark_read(id).await)
    }

    pub async fn sync_mark_all_read(&self, api: &dyn NotificationApi) -> Result<usize, TransportError> {
        api.mark_all_notifications_read().await?;
        Ok(self.mark_all_read().await)
    }

    pub async fn sync_remove(
        &self,
        api: &dyn NotificationApi,
        id: &NotificationId,
    ) -> Result<bool, TransportError> {
        api.delete_notification(id).await?;
        Ok(self.remove(id).await)
    }

    /// Deletes every notification on the server, then locally.
    pub async fn sync_clear(&self, api: &dyn NotificationApi) -> Result<(), TransportError> {
        api.clear_all_notifications().await?;
        self.clear().await;
        info!("notifications cleared");
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/notifications_tests.rs"]
mod tests;
