// src/services/notification_hub.rs
// DOCUMENTATION: Live fan-out of notifications to connected stream clients

use crate::models::Notification;
use tokio::sync::broadcast;

/// Broadcast hub shared by every worker
/// DOCUMENTATION: One channel for all clients; each stream filters on its recipient.
/// Slow receivers lag and lose the oldest messages instead of blocking senders.
#[derive(Clone)]
pub struct NotificationHub {
    sender: broadcast::Sender<Notification>,
}

impl NotificationHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Push to every live subscriber; returns how many received it
    pub fn publish(&self, notification: Notification) -> usize {
        match self.sender.send(notification) {
            Ok(receivers) => receivers,
            Err(_) => {
                log::debug!("No live notification subscribers");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NotificationKind;
    use chrono::Utc;
    use tokio::sync::broadcast::error::RecvError;
    use uuid::Uuid;

    fn notification(recipient: &str, title: &str) -> Notification {
        Notification {
            id: Uuid::new_v4(),
            recipient: recipient.to_string(),
            kind: NotificationKind::System,
            title: title.to_string(),
            message: None,
            link: None,
            resource_type: None,
            resource_id: None,
            is_read: false,
            created_at: Utc::now(),
            read_at: None,
        }
    }

    #[tokio::test]
    async fn test_fan_out_to_all_subscribers() {
        let hub = NotificationHub::new(8);
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 2);

        assert_eq!(hub.publish(notification("alice", "hello")), 2);
        assert_eq!(a.recv().await.unwrap().title, "hello");
        assert_eq!(b.recv().await.unwrap().title, "hello");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let hub = NotificationHub::new(8);
        assert_eq!(hub.publish(notification("alice", "lost")), 0);
    }

    #[tokio::test]
    async fn test_lagged_receiver_keeps_going() {
        let hub = NotificationHub::new(2);
        let mut rx = hub.subscribe();
        for i in 0..5 {
            hub.publish(notification("all", &format!("n{}", i)));
        }

        assert!(matches!(rx.recv().await, Err(RecvError::Lagged(3))));
        assert_eq!(rx.recv().await.unwrap().title, "n3");
        assert_eq!(rx.recv().await.unwrap().title, "n4");
    }

    #[test]
    fn test_visibility_filter() {
        assert!(notification("alice", "x").is_visible_to("Alice"));
        assert!(notification("all", "x").is_visible_to("bob"));
        assert!(!notification("alice", "x").is_visible_to("bob"));
    }
}
