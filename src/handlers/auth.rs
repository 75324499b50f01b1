// src/handlers/auth.rs
// DOCUMENTATION: Request authentication
// PURPOSE: Bearer token for /api/v1, X-Admin-Token for /admin

use crate::config::Config;
use crate::errors::CrmError;
use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use std::future::{ready, Ready};

pub const ACTOR_HEADER: &str = "X-Actor";
pub const ADMIN_TOKEN_HEADER: &str = "X-Admin-Token";

/// Used when a request does not name its actor
pub const DEFAULT_ACTOR: &str = "system";

/// Authenticated caller
/// DOCUMENTATION: Extracting it checks `Authorization: Bearer <API_TOKEN>`;
/// the acting user comes from X-Actor and the client address is kept for audit logs
#[derive(Debug, Clone)]
pub struct Actor {
    pub name: String,
    pub ip: Option<String>,
}

impl Actor {
    fn authenticate(req: &HttpRequest) -> Result<Self, CrmError> {
        let config = req
            .app_data::<web::Data<Config>>()
            .ok_or_else(|| CrmError::InternalError("configuration not registered".to_string()))?;

        let token = req
            .headers()
            .get(actix_web::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim)
            .ok_or_else(|| {
                log::warn!("API request without bearer token: {}", req.path());
                CrmError::Unauthorized
            })?;

        if config.api_token.is_empty() || token != config.api_token {
            log::warn!("API request with invalid token: {}", req.path());
            return Err(CrmError::Forbidden);
        }

        Ok(Actor {
            name: actor_name(req),
            ip: client_ip(req),
        })
    }
}

impl FromRequest for Actor {
    type Error = CrmError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(Actor::authenticate(req))
    }
}

fn actor_name(req: &HttpRequest) -> String {
    req.headers()
        .get(ACTOR_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|name| !name.is_empty() && name.len() <= 255)
        .unwrap_or(DEFAULT_ACTOR)
        .to_string()
}

pub fn client_ip(req: &HttpRequest) -> Option<String> {
    req.connection_info().realip_remote_addr().map(str::to_string)
}

/// Helper function to verify admin authentication
/// DOCUMENTATION: Checks X-Admin-Token header against configured admin token
pub fn verify_admin_token(req: &HttpRequest, config: &Config) -> Result<(), CrmError> {
    let token = req
        .headers()
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            log::warn!("Admin request without token");
            CrmError::Unauthorized
        })?;

    if config.admin_token.is_empty() || token != config.admin_token {
        log::warn!("Admin request with invalid token");
        return Err(CrmError::Forbidden);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    fn with_config(req: TestRequest) -> HttpRequest {
        req.app_data(web::Data::new(Config::for_tests())).to_http_request()
    }

    #[actix_rt::test]
    async fn test_actor_from_valid_token() {
        let req = with_config(
            TestRequest::default()
                .insert_header(("Authorization", "Bearer test-api-token"))
                .insert_header((ACTOR_HEADER, "  alice@crm.example.com ")),
        );

        let actor = Actor::extract(&req).await.unwrap();
        assert_eq!(actor.name, "alice@crm.example.com");
    }

    #[actix_rt::test]
    async fn test_actor_defaults_to_system() {
        let req = with_config(TestRequest::default().insert_header(("Authorization", "Bearer test-api-token")));
        assert_eq!(Actor::extract(&req).await.unwrap().name, DEFAULT_ACTOR);
    }

    #[actix_rt::test]
    async fn test_missing_and_wrong_tokens() {
        let req = with_config(TestRequest::default());
        assert!(matches!(Actor::extract(&req).await, Err(CrmError::Unauthorized)));

        let req = with_config(TestRequest::default().insert_header(("Authorization", "Basic abc")));
        assert!(matches!(Actor::extract(&req).await, Err(CrmError::Unauthorized)));

        let req = with_config(TestRequest::default().insert_header(("Authorization", "Bearer nope")));
        assert!(matches!(Actor::extract(&req).await, Err(CrmError::Forbidden)));
    }

    #[actix_rt::test]
    async fn test_empty_configured_token_rejects_everything() {
        let mut config = Config::for_tests();
        config.api_token = String::new();
        let req = TestRequest::default()
            .insert_header(("Authorization", "Bearer  "))
            .app_data(web::Data::new(config))
            .to_http_request();
        assert!(matches!(Actor::extract(&req).await, Err(CrmError::Forbidden)));
    }

    #[test]
    fn test_admin_token() {
        let config = Config::for_tests();

        let req = TestRequest::default().to_http_request();
        assert!(matches!(verify_admin_token(&req, &config), Err(CrmError::Unauthorized)));

        let req = TestRequest::default()
            .insert_header((ADMIN_TOKEN_HEADER, "wrong"))
            .to_http_request();
        assert!(matches!(verify_admin_token(&req, &config), Err(CrmError::Forbidden)));

        let req = TestRequest::default()
            .insert_header((ADMIN_TOKEN_HEADER, "test-admin-token"))
            .to_http_request();
        assert!(verify_admin_token(&req, &config).is_ok());
    }
}
