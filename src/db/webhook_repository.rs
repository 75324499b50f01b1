// src/db/webhook_repository.rs
// DOCUMENTATION: Webhook subscriptions and delivery attempts

use crate::errors::CrmError;
use crate::models::*;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

pub struct WebhookRepository;

/// One recorded attempt, as produced by the dispatcher
#[derive(Debug, Clone)]
pub struct DeliveryAttempt<'a> {
    pub webhook_id: Uuid,
    pub delivery_id: Uuid,
    pub event: &'a str,
    pub payload: &'a Value,
    pub attempt: i32,
    pub status_code: Option<i32>,
    pub success: bool,
    pub error: Option<String>,
}

impl WebhookRepository {
    pub async fn create(pool: &PgPool, req: &CreateWebhookRequest, secret: &str) -> Result<Webhook, CrmError> {
        let webhook = sqlx::query_as::<_, Webhook>(
            r#"
            INSERT INTO webhooks (url, events, secret, description)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(&req.url)
        .bind(&req.events)
        .bind(secret)
        .bind(&req.description)
        .fetch_one(pool)
        .await
        .map_err(|e| CrmError::from_db("Failed to create webhook", e))?;

        log::info!("Registered webhook {} -> {}", webhook.id, webhook.url);
        Ok(webhook)
    }

    pub async fn get_by_id(pool: &PgPool, id: Uuid) -> Result<Webhook, CrmError> {
        sqlx::query_as::<_, Webhook>("SELECT * FROM webhooks WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(|e| CrmError::from_db("Failed to fetch webhook", e))?
            .ok_or_else(|| CrmError::NotFound(format!("webhook {}", id)))
    }

    pub async fn list(pool: &PgPool) -> Result<Vec<Webhook>, CrmError> {
        sqlx::query_as::<_, Webhook>("SELECT * FROM webhooks ORDER BY created_at")
            .fetch_all(pool)
            .await
            .map_err(|e| CrmError::from_db("Failed to list webhooks", e))
    }

    /// Active webhooks subscribed to `event` (directly or through the wildcard)
    pub async fn subscribers(pool: &PgPool, event: &str) -> Result<Vec<Webhook>, CrmError> {
        sqlx::query_as::<_, Webhook>(
            r#"
            SELECT * FROM webhooks
            WHERE is_active = true AND ($1 = ANY(events) OR '*' = ANY(events))
            "#,
        )
        .bind(event)
        .fetch_all(pool)
        .await
        .map_err(|e| CrmError::from_db("Failed to load webhook subscribers", e))
    }

    pub async fn update(pool: &PgPool, id: Uuid, req: &UpdateWebhookRequest) -> Result<Webhook, CrmError> {
        sqlx::query_as::<_, Webhook>(
            r#"
            UPDATE webhooks
            SET url = COALESCE($1, url),
                events = COALESCE($2, events),
                description = COALESCE($3, description),
                is_active = COALESCE($4, is_active),
                updated_at = NOW()
            WHERE id = $5
            RETURNING *
            "#,
        )
        .bind(&req.url)
        .bind(&req.events)
        .bind(&req.description)
        .bind(req.is_active)
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| CrmError::from_db("Failed to update webhook", e))?
        .ok_or_else(|| CrmError::NotFound(format!("webhook {}", id)))
    }

    pub async fn rotate_secret(pool: &PgPool, id: Uuid, secret: &str) -> Result<Webhook, CrmError> {
        sqlx::query_as::<_, Webhook>(
            "UPDATE webhooks SET secret = $1, updated_at = NOW() WHERE id = $2 RETURNING *",
        )
        .bind(secret)
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| CrmError::from_db("Failed to rotate webhook secret", e))?
        .ok_or_else(|| CrmError::NotFound(format!("webhook {}", id)))
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<(), CrmError> {
        let result = sqlx::query("DELETE FROM webhooks WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await
            .map_err(|e| CrmError::from_db("Failed to delete webhook", e))?;

        if result.rows_affected() == 0 {
            return Err(CrmError::NotFound(format!("webhook {}", id)));
        }
        log::info!("Deleted webhook {}", id);
        Ok(())
    }

    pub async fn record_attempt(pool: &PgPool, attempt: &DeliveryAttempt<'_>) -> Result<(), CrmError> {
        sqlx::query(
            r#"
            INSERT INTO webhook_deliveries
                (webhook_id, delivery_id, event, payload, attempt, status_code, success, error)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(attempt.webhook_id)
        .bind(attempt.delivery_id)
        .bind(attempt.event)
        .bind(attempt.payload)
        .bind(attempt.attempt)
        .bind(attempt.status_code)
        .bind(attempt.success)
        .bind(&attempt.error)
        .execute(pool)
        .await
        .map_err(|e| CrmError::from_db("Failed to record webhook delivery", e))?;
        Ok(())
    }

    pub async fn deliveries(
        pool: &PgPool,
        webhook_id: Uuid,
        query: &DeliveryQuery,
    ) -> Result<(Vec<WebhookDelivery>, i64), CrmError> {
        let params = query.page_params();

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM webhook_deliveries WHERE webhook_id = $1")
            .bind(webhook_id)
            .fetch_one(pool)
            .await
            .map_err(|e| CrmError::from_db("Delivery count query failed", e))?;

        let deliveries = sqlx::query_as::<_, WebhookDelivery>(
            r#"
            SELECT * FROM webhook_deliveries
            WHERE webhook_id = $1
            ORDER BY created_at DESC, attempt DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(webhook_id)
        .bind(params.limit)
        .bind(params.offset())
        .fetch_all(pool)
        .await
        .map_err(|e| CrmError::from_db("Delivery list query failed", e))?;

        Ok((deliveries, total))
    }
}
