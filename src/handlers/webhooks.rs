// src/handlers/webhooks.rs
// DOCUMENTATION: HTTP handlers for webhook subscriptions

use crate::errors::CrmError;
use crate::handlers::auth::Actor;
use crate::models::{CreateWebhookRequest, DeliveryQuery, UpdateWebhookRequest};
use crate::services::{EventPublisher, WebhookService};
use actix_web::{web, HttpResponse, Responder};
use sqlx::PgPool;
use uuid::Uuid;

/// POST /api/v1/webhooks
/// The secret is only shown here and on rotation
pub async fn create_webhook(
    _actor: Actor,
    pool: web::Data<PgPool>,
    body: web::Json<CreateWebhookRequest>,
) -> Result<impl Responder, CrmError> {
    let webhook = WebhookService::create(pool.get_ref(), body.into_inner()).await?;
    Ok(HttpResponse::Created().json(webhook))
}

/// GET /api/v1/webhooks
pub async fn list_webhooks(_actor: Actor, pool: web::Data<PgPool>) -> Result<impl Responder, CrmError> {
    let webhooks = WebhookService::list(pool.get_ref()).await?;
    Ok(HttpResponse::Ok().json(webhooks))
}

/// GET /api/v1/webhooks/{id}
pub async fn get_webhook(
    _actor: Actor,
    pool: web::Data<PgPool>,
    path: web::Path<Uuid>,
) -> Result<impl Responder, CrmError> {
    let webhook = WebhookService::get(pool.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(webhook))
}

/// PUT /api/v1/webhooks/{id}
pub async fn update_webhook(
    _actor: Actor,
    pool: web::Data<PgPool>,
    path: web::Path<Uuid>,
    body: web::Json<UpdateWebhookRequest>,
) -> Result<impl Responder, CrmError> {
    let webhook = WebhookService::update(pool.get_ref(), path.into_inner(), body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(webhook))
}

/// DELETE /api/v1/webhooks/{id}
pub async fn delete_webhook(
    _actor: Actor,
    pool: web::Data<PgPool>,
    path: web::Path<Uuid>,
) -> Result<impl Responder, CrmError> {
    WebhookService::delete(pool.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// POST /api/v1/webhooks/{id}/rotate-secret
pub async fn rotate_secret(
    _actor: Actor,
    pool: web::Data<PgPool>,
    path: web::Path<Uuid>,
) -> Result<impl Responder, CrmError> {
    let webhook = WebhookService::rotate_secret(pool.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(webhook))
}

/// POST /api/v1/webhooks/{id}/test
/// Delivers `webhook.test` inline and returns the outcome
pub async fn test_webhook(
    actor: Actor,
    pool: web::Data<PgPool>,
    publisher: web::Data<EventPublisher>,
    path: web::Path<Uuid>,
) -> Result<impl Responder, CrmError> {
    let outcome =
        WebhookService::send_test(pool.get_ref(), publisher.dispatcher(), path.into_inner(), &actor.name).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

/// GET /api/v1/webhooks/{id}/deliveries
pub async fn list_deliveries(
    _actor: Actor,
    pool: web::Data<PgPool>,
    path: web::Path<Uuid>,
    query: web::Query<DeliveryQuery>,
) -> Result<impl Responder, CrmError> {
    let deliveries = WebhookService::deliveries(pool.get_ref(), path.into_inner(), query.into_inner()).await?;
    Ok(HttpResponse::Ok().json(deliveries))
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/webhooks")
            .route("", web::post().to(create_webhook))
            .route("", web::get().to(list_webhooks))
            .route("/{id}", web::get().to(get_webhook))
            .route("/{id}", web::put().to(update_webhook))
            .route("/{id}", web::patch().to(update_webhook))
            .route("/{id}", web::delete().to(delete_webhook))
            .route("/{id}/rotate-secret", web::post().to(rotate_secret))
            .route("/{id}/test", web::post().to(test_webhook))
            .route("/{id}/deliveries", web::get().to(list_deliveries)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{api_request, test_state};
    use actix_web::{http::StatusCode, test, App};
    use serde_json::json;

    #[actix_rt::test]
    async fn test_unknown_event_is_rejected() {
        let state = test_state();
        let app = test::init_service(App::new().configure(|c| state.register(c)).configure(config)).await;

        let req = api_request(test::TestRequest::post().uri("/webhooks"))
            .set_json(json!({ "url": "https://hooks.example.com/crm", "events": ["organisation.exploded"] }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_rt::test]
    async fn test_empty_event_list_is_rejected() {
        let state = test_state();
        let app = test::init_service(App::new().configure(|c| state.register(c)).configure(config)).await;

        let req = api_request(test::TestRequest::post().uri("/webhooks"))
            .set_json(json!({ "url": "https://hooks.example.com/crm", "events": [] }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
