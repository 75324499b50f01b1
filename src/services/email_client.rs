// src/services/email_client.rs
// DOCUMENTATION: Outbound email providers
// PURPOSE: Campaign sending goes through the EmailSender trait

use crate::config::Config;
use crate::errors::CrmError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// One rendered message
#[derive(Debug, Clone, Serialize)]
pub struct EmailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
    /// Added as a List-Unsubscribe header when present
    #[serde(skip)]
    pub unsubscribe_url: Option<String>,
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), CrmError>;

    fn name(&self) -> &'static str;
}

/// Transactional email API with bearer authentication (JSON `{from, to, subject, html, headers}`)
pub struct HttpEmailSender {
    client: Client,
    api_url: String,
    api_key: String,
}

impl HttpEmailSender {
    pub fn new(api_url: String, api_key: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(20))
                .build()
                .unwrap_or_default(),
            api_url,
            api_key,
        }
    }

    fn body(message: &EmailMessage) -> serde_json::Value {
        let mut body = json!({
            "from": message.from,
            "to": [message.to],
            "subject": message.subject,
            "html": message.html,
        });
        if let Some(url) = &message.unsubscribe_url {
            body["headers"] = json!({ "List-Unsubscribe": format!("<{}>", url) });
        }
        body
    }
}

#[async_trait]
impl EmailSender for HttpEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<(), CrmError> {
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&Self::body(message))
            .send()
            .await
            .map_err(|e| CrmError::ExternalApiError(format!("Email provider unreachable: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(CrmError::RateLimitExceeded);
        }

        let detail = response.text().await.unwrap_or_default();
        Err(CrmError::ExternalApiError(format!(
            "Email provider returned {}: {}",
            status,
            detail.chars().take(300).collect::<String>()
        )))
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Development sender: messages are logged, never delivered
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<(), CrmError> {
        log::info!(
            "[email:log] to={} subject={:?} ({} bytes)",
            message.to,
            message.subject,
            message.html.len()
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

pub fn email_sender_from_config(config: &Config) -> Arc<dyn EmailSender> {
    if config.email_enabled() {
        Arc::new(HttpEmailSender::new(
            config.email_api_url.clone(),
            config.email_api_key.clone(),
        ))
    } else {
        log::warn!("Email provider not configured, campaign messages will only be logged");
        Arc::new(LogEmailSender)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> EmailMessage {
        EmailMessage {
            from: "news@crm.example.com".to_string(),
            to: "claire@example.com".to_string(),
            subject: "Quarterly letter".to_string(),
            html: "<p>Hi</p>".to_string(),
            unsubscribe_url: None,
        }
    }

    #[test]
    fn test_provider_body() {
        let body = HttpEmailSender::body(&message());
        assert_eq!(body["to"][0], "claire@example.com");
        assert!(body.get("headers").is_none());

        let with_unsub = EmailMessage {
            unsubscribe_url: Some("https://crm.example.com/t/unsubscribe/1".to_string()),
            ..message()
        };
        let body = HttpEmailSender::body(&with_unsub);
        assert_eq!(body["headers"]["List-Unsubscribe"], "<https://crm.example.com/t/unsubscribe/1>");
    }

    #[tokio::test]
    async fn test_log_sender_accepts_everything() {
        let sender = LogEmailSender;
        tokio_test::assert_ok!(sender.send(&message()).await);
        assert_eq!(sender.name(), "log");
    }

    #[test]
    fn test_sender_selection() {
        let mut config = Config::for_tests();
        config.email_api_key = String::new();
        assert_eq!(email_sender_from_config(&config).name(), "log");

        config.email_api_url = "https://mail.example.com/emails".to_string();
        config.email_api_key = "key".to_string();
        assert_eq!(email_sender_from_config(&config).name(), "http");
    }
}
