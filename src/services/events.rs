// src/services/events.rs
// DOCUMENTATION: Domain event fan-out
// PURPOSE: One entry point for webhooks (external) and notifications (internal)

use crate::db::NotificationRepository;
use crate::errors::CrmError;
use crate::models::{CreateNotificationRequest, Notification};
use crate::services::{NotificationHub, WebhookDispatcher};
use serde::Serialize;
use sqlx::PgPool;

#[derive(Clone)]
pub struct EventPublisher {
    pool: PgPool,
    dispatcher: WebhookDispatcher,
    hub: NotificationHub,
}

impl EventPublisher {
    pub fn new(pool: PgPool, dispatcher: WebhookDispatcher, hub: NotificationHub) -> Self {
        Self { pool, dispatcher, hub }
    }

    pub fn hub(&self) -> &NotificationHub {
        &self.hub
    }

    pub fn dispatcher(&self) -> &WebhookDispatcher {
        &self.dispatcher
    }

    /// Fire-and-forget webhook fan-out; never fails the calling request
    pub fn emit<T: Serialize>(&self, event: &'static str, data: &T) {
        let payload = match serde_json::to_value(data) {
            Ok(payload) => payload,
            Err(e) => {
                log::error!("Could not serialize {} payload: {}", event, e);
                return;
            }
        };

        let dispatcher = self.dispatcher.clone();
        tokio::spawn(async move {
            dispatcher.dispatch(event, payload).await;
        });
    }

    /// Persist a notification and push it to live streams
    pub async fn notify(&self, req: CreateNotificationRequest) -> Result<Notification, CrmError> {
        let notification = NotificationRepository::create(&self.pool, &req).await?;
        let live = self.hub.publish(notification.clone());
        log::debug!(
            "Notification {} for {} pushed to {} stream(s)",
            notification.id,
            notification.recipient,
            live
        );
        Ok(notification)
    }

    /// Side-effect notification: a failure is logged, not returned
    pub async fn notify_quietly(&self, req: CreateNotificationRequest) {
        let recipient = req.recipient.clone();
        if let Err(e) = self.notify(req).await {
            log::warn!("Could not notify {}: {}", recipient, e);
        }
    }
}
