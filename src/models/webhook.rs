// src/models/webhook.rs
// DOCUMENTATION: Webhook subscriptions and their delivery log

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use super::PageParams;

/// Subscribes to every event
pub const WILDCARD_EVENT: &str = "*";

/// Every event name a webhook may subscribe to
pub const EVENT_NAMES: &[&str] = &[
    "organisation.created",
    "organisation.updated",
    "organisation.deleted",
    "person.created",
    "person.updated",
    "person.deleted",
    "person.anonymized",
    "interaction.created",
    "interaction.updated",
    "interaction.deleted",
    "mandate.created",
    "mandate.updated",
    "mandate.status_changed",
    "campaign.sent",
    "autofill.applied",
    "webhook.test",
];

pub fn is_known_event(name: &str) -> bool {
    name == WILDCARD_EVENT || EVENT_NAMES.contains(&name)
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Webhook {
    pub id: Uuid,
    pub url: String,
    pub events: Vec<String>,
    /// HMAC key; only returned on creation and rotation
    #[serde(skip_serializing)]
    pub secret: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Webhook {
    pub fn subscribes_to(&self, event: &str) -> bool {
        self.is_active && self.events.iter().any(|e| e == WILDCARD_EVENT || e == event)
    }
}

/// Response carrying the signing secret (create / rotate-secret only)
#[derive(Debug, Serialize)]
pub struct WebhookWithSecret {
    #[serde(flatten)]
    pub webhook: Webhook,
    pub secret: String,
}

impl From<Webhook> for WebhookWithSecret {
    fn from(webhook: Webhook) -> Self {
        let secret = webhook.secret.clone();
        Self { webhook, secret }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateWebhookRequest {
    #[validate(url)]
    pub url: String,

    #[validate(length(min = 1))]
    pub events: Vec<String>,

    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize, Validate)]
pub struct UpdateWebhookRequest {
    #[validate(url)]
    pub url: Option<String>,

    #[validate(length(min = 1))]
    pub events: Option<Vec<String>>,

    pub description: Option<String>,

    pub is_active: Option<bool>,
}

/// Reject event names nobody emits, and non-HTTP targets
pub fn validate_subscription(url: Option<&str>, events: Option<&[String]>) -> Result<(), crate::errors::CrmError> {
    if let Some(url) = url {
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(crate::errors::CrmError::ValidationError(
                "webhook url must use http or https".to_string(),
            ));
        }
    }

    if let Some(events) = events {
        if let Some(unknown) = events.iter().find(|e| !is_known_event(e)) {
            return Err(crate::errors::CrmError::ValidationError(format!(
                "unknown event '{}'",
                unknown
            )));
        }
    }

    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WebhookDelivery {
    pub id: Uuid,
    pub webhook_id: Uuid,
    /// Shared by every attempt of the same delivery
    pub delivery_id: Uuid,
    pub event: String,
    pub payload: Value,
    pub attempt: i32,
    pub status_code: Option<i32>,
    pub success: bool,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeliveryQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl DeliveryQuery {
    pub fn page_params(&self) -> PageParams {
        PageParams::new(self.page, self.limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn webhook(events: &[&str], is_active: bool) -> Webhook {
        Webhook {
            id: Uuid::new_v4(),
            url: "https://hooks.example.com/crm".to_string(),
            events: events.iter().map(|e| e.to_string()).collect(),
            secret: "s3cret".to_string(),
            description: None,
            is_active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_event_matching() {
        let hook = webhook(&["person.created", "mandate.status_changed"], true);
        assert!(hook.subscribes_to("person.created"));
        assert!(!hook.subscribes_to("person.updated"));

        assert!(webhook(&["*"], true).subscribes_to("campaign.sent"));
        assert!(!webhook(&["*"], false).subscribes_to("campaign.sent"));
    }

    #[test]
    fn test_validate_subscription() {
        let events = vec!["person.created".to_string(), "*".to_string()];
        assert!(validate_subscription(Some("https://x.example"), Some(&events)).is_ok());

        let bad = vec!["person.exploded".to_string()];
        assert!(validate_subscription(None, Some(&bad)).is_err());
        assert!(validate_subscription(Some("ftp://x.example"), None).is_err());
    }

    #[test]
    fn test_secret_not_serialized() {
        let hook = webhook(&["*"], true);
        let json = serde_json::to_value(&hook).unwrap();
        assert!(json.get("secret").is_none());

        let json = serde_json::to_value(WebhookWithSecret::from(hook)).unwrap();
        assert_eq!(json["secret"], "s3cret");
    }
}
