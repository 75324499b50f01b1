// src/db/notification_repository.rs
// DOCUMENTATION: Persisted notifications; live delivery goes through the hub

use crate::errors::CrmError;
use crate::models::*;
use sqlx::PgPool;
use uuid::Uuid;

pub struct NotificationRepository;

impl NotificationRepository {
    pub async fn create(pool: &PgPool, req: &CreateNotificationRequest) -> Result<Notification, CrmError> {
        sqlx::query_as::<_, Notification>(
            r#"
            INSERT INTO notifications (recipient, kind, title, message, link, resource_type, resource_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(req.recipient.trim())
        .bind(req.kind.as_str())
        .bind(&req.title)
        .bind(&req.message)
        .bind(&req.link)
        .bind(&req.resource_type)
        .bind(req.resource_id)
        .fetch_one(pool)
        .await
        .map_err(|e| CrmError::from_db("Failed to create notification", e))
    }

    /// Notifications addressed to `recipient` or broadcast to everyone
    pub async fn list(
        pool: &PgPool,
        recipient: &str,
        query: &NotificationQuery,
    ) -> Result<(Vec<Notification>, i64), CrmError> {
        let params = query.page_params();

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM notifications
            WHERE (LOWER(recipient) = LOWER($1) OR recipient = $2)
              AND (NOT $3 OR is_read = false)
            "#,
        )
        .bind(recipient)
        .bind(BROADCAST_RECIPIENT)
        .bind(query.unread_only)
        .fetch_one(pool)
        .await
        .map_err(|e| CrmError::from_db("Notification count query failed", e))?;

        let notifications = sqlx::query_as::<_, Notification>(
            r#"
            SELECT * FROM notifications
            WHERE (LOWER(recipient) = LOWER($1) OR recipient = $2)
              AND (NOT $3 OR is_read = false)
            ORDER BY created_at DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(recipient)
        .bind(BROADCAST_RECIPIENT)
        .bind(query.unread_only)
        .bind(params.limit)
        .bind(params.offset())
        .fetch_all(pool)
        .await
        .map_err(|e| CrmError::from_db("Notification list query failed", e))?;

        Ok((notifications, total))
    }

    pub async fn unread_count(pool: &PgPool, recipient: &str) -> Result<i64, CrmError> {
        sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM notifications
            WHERE (LOWER(recipient) = LOWER($1) OR recipient = $2) AND is_read = false
            "#,
        )
        .bind(recipient)
        .bind(BROADCAST_RECIPIENT)
        .fetch_one(pool)
        .await
        .map_err(|e| CrmError::from_db("Unread count query failed", e))
    }

    pub async fn mark_read(pool: &PgPool, id: Uuid) -> Result<Notification, CrmError> {
        sqlx::query_as::<_, Notification>(
            r#"
            UPDATE notifications
            SET is_read = true, read_at = COALESCE(read_at, NOW())
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| CrmError::from_db("Failed to mark notification read", e))?
        .ok_or_else(|| CrmError::NotFound(format!("notification {}", id)))
    }

    /// Marks only notifications addressed to `recipient`; broadcasts are shared
    pub async fn mark_all_read(pool: &PgPool, recipient: &str) -> Result<u64, CrmError> {
        sqlx::query(
            r#"
            UPDATE notifications
            SET is_read = true, read_at = NOW()
            WHERE LOWER(recipient) = LOWER($1) AND is_read = false
            "#,
        )
        .bind(recipient)
        .execute(pool)
        .await
        .map(|r| r.rows_affected())
        .map_err(|e| CrmError::from_db("Failed to mark notifications read", e))
    }
}
