// src/services/notification_service.rs
// DOCUMENTATION: Notification inbox operations

use crate::db::NotificationRepository;
use crate::errors::CrmError;
use crate::models::*;
use crate::services::EventPublisher;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

pub struct NotificationService;

impl NotificationService {
    pub async fn create(
        publisher: &EventPublisher,
        req: CreateNotificationRequest,
    ) -> Result<Notification, CrmError> {
        req.validate()?;
        publisher.notify(req).await
    }

    pub async fn list(
        pool: &PgPool,
        recipient: &str,
        query: NotificationQuery,
    ) -> Result<Paginated<Notification>, CrmError> {
        let (notifications, total) = NotificationRepository::list(pool, recipient, &query).await?;
        Ok(Paginated::new(notifications, total, query.page_params()))
    }

    pub async fn unread_count(pool: &PgPool, recipient: &str) -> Result<UnreadCount, CrmError> {
        let unread = NotificationRepository::unread_count(pool, recipient).await?;
        Ok(UnreadCount {
            recipient: recipient.to_string(),
            unread,
        })
    }

    pub async fn mark_read(pool: &PgPool, id: Uuid) -> Result<Notification, CrmError> {
        NotificationRepository::mark_read(pool, id).await
    }

    pub async fn mark_all_read(pool: &PgPool, recipient: &str) -> Result<u64, CrmError> {
        let updated = NotificationRepository::mark_all_read(pool, recipient).await?;
        log::debug!("Marked {} notification(s) read for {}", updated, recipient);
        Ok(updated)
    }
}
