// src/services/webhook_service.rs
// DOCUMENTATION: Webhook management and signed delivery with retries
// PURPOSE: Push domain events to subscriber URLs

use crate::db::{DeliveryAttempt, WebhookRepository};
use crate::errors::CrmError;
use crate::models::*;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};
use sha2::Sha256;
use sqlx::PgPool;
use std::time::Duration;
use uuid::Uuid;
use validator::Validate;

type HmacSha256 = Hmac<Sha256>;

pub const EVENT_HEADER: &str = "X-Crm-Event";
pub const DELIVERY_HEADER: &str = "X-Crm-Delivery";
pub const SIGNATURE_HEADER: &str = "X-Crm-Signature";

/// `sha256=<hex>` HMAC of the exact request body
pub fn sign(secret: &str, body: &[u8]) -> Result<String, CrmError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| CrmError::InternalError(format!("Invalid webhook secret: {}", e)))?;
    mac.update(body);
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

/// 256 random bits, hex encoded
pub fn generate_secret() -> String {
    format!(
        "whsec_{}{}",
        hex::encode(Uuid::new_v4().as_bytes()),
        hex::encode(Uuid::new_v4().as_bytes())
    )
}

/// Body sent to subscribers
pub fn envelope(delivery_id: Uuid, event: &str, data: Value) -> Value {
    json!({
        "id": delivery_id,
        "event": event,
        "created_at": Utc::now(),
        "data": data,
    })
}

/// Result of one delivery (all attempts)
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryOutcome {
    pub webhook_id: Uuid,
    pub delivery_id: Uuid,
    pub attempts: u32,
    pub success: bool,
    pub status_code: Option<i32>,
}

/// Sends events to subscribed webhooks
/// DOCUMENTATION: Attempt n waits base_delay * 2^(n-1) before attempt n+1
#[derive(Clone)]
pub struct WebhookDispatcher {
    pool: PgPool,
    client: Client,
    max_attempts: u32,
    base_delay: Duration,
}

impl WebhookDispatcher {
    pub fn new(pool: PgPool, timeout_seconds: u64, max_attempts: u32) -> Self {
        Self {
            pool,
            client: Client::builder()
                .timeout(Duration::from_secs(timeout_seconds))
                .build()
                .unwrap_or_default(),
            max_attempts: max_attempts.max(1),
            base_delay: Duration::from_secs(1),
        }
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }

    /// Deliver `event` to every matching webhook in the background
    /// DOCUMENTATION: returns the number of deliveries started
    pub async fn dispatch(&self, event: &str, data: Value) -> usize {
        let hooks = match WebhookRepository::subscribers(&self.pool, event).await {
            Ok(hooks) => hooks,
            Err(e) => {
                log::error!("Could not load webhook subscribers for {}: {}", event, e);
                return 0;
            }
        };

        let count = hooks.len();
        for hook in hooks {
            let dispatcher = self.clone();
            let event = event.to_string();
            let data = data.clone();
            tokio::spawn(async move {
                dispatcher.deliver(&hook, &event, data).await;
            });
        }

        if count > 0 {
            log::debug!("Dispatching {} to {} webhook(s)", event, count);
        }
        count
    }

    /// Deliver one event to one webhook, retrying non-2xx answers and network errors
    pub async fn deliver(&self, webhook: &Webhook, event: &str, data: Value) -> DeliveryOutcome {
        let delivery_id = Uuid::new_v4();
        let payload = envelope(delivery_id, event, data);
        let mut outcome = DeliveryOutcome {
            webhook_id: webhook.id,
            delivery_id,
            attempts: 0,
            success: false,
            status_code: None,
        };

        let body = match serde_json::to_vec(&payload) {
            Ok(body) => body,
            Err(e) => {
                log::error!("Could not serialize webhook payload: {}", e);
                return outcome;
            }
        };
        let signature = match sign(&webhook.secret, &body) {
            Ok(signature) => signature,
            Err(e) => {
                log::error!("Could not sign webhook {}: {}", webhook.id, e);
                return outcome;
            }
        };

        for attempt in 1..=self.max_attempts {
            let result = self
                .client
                .post(&webhook.url)
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .header(EVENT_HEADER, event)
                .header(DELIVERY_HEADER, delivery_id.to_string())
                .header(SIGNATURE_HEADER, &signature)
                .body(body.clone())
                .send()
                .await;

            let (status_code, success, error) = match result {
                Ok(response) => {
                    let status = response.status();
                    (
                        Some(status.as_u16() as i32),
                        status.is_success(),
                        (!status.is_success()).then(|| format!("HTTP {}", status)),
                    )
                }
                Err(e) => (None, false, Some(e.to_string())),
            };

            outcome.attempts = attempt;
            outcome.success = success;
            outcome.status_code = status_code;

            let record = DeliveryAttempt {
                webhook_id: webhook.id,
                delivery_id,
                event,
                payload: &payload,
                attempt: attempt as i32,
                status_code,
                success,
                error: error.clone(),
            };
            if let Err(e) = WebhookRepository::record_attempt(&self.pool, &record).await {
                log::error!("Could not record webhook attempt: {}", e);
            }

            if success {
                log::info!(
                    "Webhook {} accepted {} (delivery {}, attempt {})",
                    webhook.id,
                    event,
                    delivery_id,
                    attempt
                );
                return outcome;
            }

            log::warn!(
                "Webhook {} attempt {}/{} for {} failed: {}",
                webhook.id,
                attempt,
                self.max_attempts,
                event,
                error.unwrap_or_default()
            );

            if attempt < self.max_attempts {
                tokio::time::sleep(self.backoff(attempt)).await;
            }
        }

        log::error!("Webhook {} gave up on delivery {}", webhook.id, delivery_id);
        outcome
    }
}

pub struct WebhookService;

impl WebhookService {
    pub async fn create(pool: &PgPool, req: CreateWebhookRequest) -> Result<WebhookWithSecret, CrmError> {
        req.validate()?;
        validate_subscription(Some(&req.url), Some(&req.events))?;

        let webhook = WebhookRepository::create(pool, &req, &generate_secret()).await?;
        Ok(webhook.into())
    }

    pub async fn list(pool: &PgPool) -> Result<Vec<Webhook>, CrmError> {
        WebhookRepository::list(pool).await
    }

    pub async fn get(pool: &PgPool, id: Uuid) -> Result<Webhook, CrmError> {
        WebhookRepository::get_by_id(pool, id).await
    }

    pub async fn update(pool: &PgPool, id: Uuid, req: UpdateWebhookRequest) -> Result<Webhook, CrmError> {
        req.validate()?;
        validate_subscription(req.url.as_deref(), req.events.as_deref())?;
        WebhookRepository::update(pool, id, &req).await
    }

    pub async fn rotate_secret(pool: &PgPool, id: Uuid) -> Result<WebhookWithSecret, CrmError> {
        let webhook = WebhookRepository::rotate_secret(pool, id, &generate_secret()).await?;
        log::info!("Rotated secret of webhook {}", id);
        Ok(webhook.into())
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<(), CrmError> {
        WebhookRepository::delete(pool, id).await
    }

    /// Synchronous `webhook.test` delivery so the caller sees the outcome
    pub async fn send_test(
        pool: &PgPool,
        dispatcher: &WebhookDispatcher,
        id: Uuid,
        actor: &str,
    ) -> Result<DeliveryOutcome, CrmError> {
        let webhook = WebhookRepository::get_by_id(pool, id).await?;
        let data = json!({ "webhook_id": webhook.id, "requested_by": actor });
        Ok(dispatcher.deliver(&webhook, "webhook.test", data).await)
    }

    pub async fn deliveries(
        pool: &PgPool,
        id: Uuid,
        query: DeliveryQuery,
    ) -> Result<Paginated<WebhookDelivery>, CrmError> {
        WebhookRepository::get_by_id(pool, id).await?;
        let (deliveries, total) = WebhookRepository::deliveries(pool, id, &query).await?;
        Ok(Paginated::new(deliveries, total, query.page_params()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_matches_known_vector() {
        let signature = sign("key", b"The quick brown fox jumps over the lazy dog").unwrap();
        assert_eq!(
            signature,
            "sha256=f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8"
        );
    }

    #[test]
    fn test_signature_depends_on_secret_and_body() {
        let a = sign("s1", b"{}").unwrap();
        assert_ne!(a, sign("s2", b"{}").unwrap());
        assert_ne!(a, sign("s1", b"{ }").unwrap());
    }

    #[test]
    fn test_generated_secrets_are_unique() {
        let a = generate_secret();
        let b = generate_secret();
        assert_ne!(a, b);
        assert!(a.starts_with("whsec_"));
        assert_eq!(a.len(), "whsec_".len() + 64);
    }

    #[test]
    fn test_envelope_shape() {
        let id = Uuid::new_v4();
        let body = envelope(id, "person.created", json!({ "id": 7 }));
        assert_eq!(body["id"], id.to_string());
        assert_eq!(body["event"], "person.created");
        assert_eq!(body["data"]["id"], 7);
        assert!(body["created_at"].is_string());
    }

    #[tokio::test]
    async fn test_backoff_doubles() {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();
        let dispatcher = WebhookDispatcher::new(pool, 5, 3);
        assert_eq!(dispatcher.backoff(1), Duration::from_secs(1));
        assert_eq!(dispatcher.backoff(2), Duration::from_secs(2));
        assert_eq!(dispatcher.backoff(3), Duration::from_secs(4));
    }
}
