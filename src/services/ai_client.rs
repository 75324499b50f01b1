// src/services/ai_client.rs
// DOCUMENTATION: Client for an OpenAI-compatible chat completions endpoint
// PURPOSE: Turn free text into structured contact fields

use crate::config::Config;
use crate::errors::CrmError;
use crate::models::ExtractedContact;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

const SYSTEM_PROMPT: &str = "You extract business contact details from text. \
Answer with a single JSON object using exactly these keys: first_name, last_name, email, \
phone, job_title, organisation, website, country_code (ISO 3166-1 alpha-2). \
Use null for anything not present in the text. Never invent values.";

/// AI provider client
/// DOCUMENTATION: Calls are throttled locally so a burst of imports cannot exhaust the provider quota
#[derive(Clone)]
pub struct AiClient {
    client: Client,
    api_url: String,
    api_key: String,
    model: String,
    limiter: Arc<DefaultDirectRateLimiter>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

impl AiClient {
    pub fn new(api_url: String, api_key: String, model: String, requests_per_minute: u32) -> Self {
        let quota = Quota::per_minute(NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN));

        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            api_url,
            api_key,
            model,
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    /// None when no API key is configured
    pub fn from_config(config: &Config) -> Option<Self> {
        config.ai_enabled().then(|| {
            Self::new(
                config.ai_api_url.clone(),
                config.ai_api_key.clone(),
                config.ai_model.clone(),
                config.ai_requests_per_minute,
            )
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Ask the provider for contact fields; returns the raw JSON object text
    /// DOCUMENTATION: RateLimitExceeded when the local quota is spent, so callers can fall back
    pub async fn extract_raw(&self, text: &str) -> Result<String, CrmError> {
        if self.limiter.check().is_err() {
            log::warn!("AI rate limit reached, skipping provider call");
            return Err(CrmError::RateLimitExceeded);
        }

        let body = json!({
            "model": self.model,
            "temperature": 0,
            "response_format": { "type": "json_object" },
            "messages": [
                ChatMessage { role: "system", content: SYSTEM_PROMPT },
                ChatMessage { role: "user", content: text },
            ],
        });

        log::debug!("AI extraction request: model={}, {} chars", self.model, text.len());

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                log::error!("AI provider request failed: {}", e);
                CrmError::ExternalApiError(format!("Request failed: {}", e))
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            log::error!("AI provider quota exceeded");
            return Err(CrmError::RateLimitExceeded);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::error!("AI provider error {}: {}", status, body);
            return Err(CrmError::ExternalApiError(format!("API error {}: {}", status, body)));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            log::error!("Failed to parse AI provider response: {}", e);
            CrmError::ExternalApiError(format!("Parse error: {}", e))
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| CrmError::ExternalApiError("Empty completion".to_string()))
    }

    /// Parse a completion into fields, tolerating markdown code fences
    pub fn parse_content(content: &str) -> Result<ExtractedContact, CrmError> {
        let trimmed = content.trim();
        let unfenced = trimmed
            .strip_prefix("```json")
            .or_else(|| trimmed.strip_prefix("```"))
            .map(|s| s.trim_end().trim_end_matches("```"))
            .unwrap_or(trimmed);

        serde_json::from_str::<ExtractedContact>(unfenced.trim())
            .map(ExtractedContact::cleaned)
            .map_err(|e| CrmError::ExternalApiError(format!("Unexpected completion format: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_json() {
        let contact = AiClient::parse_content(
            r#"{"first_name":"Marie","last_name":"Dupont","email":"Marie@Acme.lu","phone":null,
                "job_title":"CFO","organisation":"Acme","website":null,"country_code":"lu"}"#,
        )
        .unwrap();

        assert_eq!(contact.first_name.as_deref(), Some("Marie"));
        assert_eq!(contact.email.as_deref(), Some("marie@acme.lu"));
        assert_eq!(contact.country_code.as_deref(), Some("LU"));
        assert_eq!(contact.phone, None);
    }

    #[test]
    fn test_parse_fenced_json_with_missing_keys() {
        let contact = AiClient::parse_content("```json\n{\"last_name\": \"Curie\", \"email\": \"\"}\n```").unwrap();
        assert_eq!(contact.last_name.as_deref(), Some("Curie"));
        assert_eq!(contact.email, None);
    }

    #[test]
    fn test_parse_garbage() {
        assert!(matches!(
            AiClient::parse_content("Sorry, I cannot help with that."),
            Err(CrmError::ExternalApiError(_))
        ));
    }

    #[tokio::test]
    async fn test_local_rate_limit() {
        let client = AiClient::new("http://127.0.0.1:9/unused".into(), "key".into(), "m".into(), 1);
        // first call consumes the only permit, and fails on the network
        assert!(!matches!(client.extract_raw("x").await, Err(CrmError::RateLimitExceeded)));
        assert!(matches!(client.extract_raw("x").await, Err(CrmError::RateLimitExceeded)));
    }

    #[test]
    fn test_disabled_without_key() {
        assert!(AiClient::from_config(&Config::for_tests()).is_none());
    }
}
