// src/handlers/mandates.rs
// DOCUMENTATION: HTTP handlers for mandates and their lifecycle

use crate::errors::CrmError;
use crate::handlers::auth::Actor;
use crate::models::{CreateMandateRequest, MandateQuery, MandateStatusRequest, UpdateMandateRequest};
use crate::services::{EventPublisher, MandateService};
use actix_web::{web, HttpResponse, Responder};
use sqlx::PgPool;
use uuid::Uuid;

/// POST /api/v1/mandates
pub async fn create_mandate(
    actor: Actor,
    pool: web::Data<PgPool>,
    publisher: web::Data<EventPublisher>,
    body: web::Json<CreateMandateRequest>,
) -> Result<impl Responder, CrmError> {
    let mandate = MandateService::create(pool.get_ref(), publisher.get_ref(), &actor.name, body.into_inner()).await?;
    Ok(HttpResponse::Created().json(mandate))
}

/// GET /api/v1/mandates
pub async fn search_mandates(
    _actor: Actor,
    pool: web::Data<PgPool>,
    query: web::Query<MandateQuery>,
) -> Result<impl Responder, CrmError> {
    let result = MandateService::search(pool.get_ref(), query.into_inner()).await?;
    Ok(HttpResponse::Ok().json(result))
}

/// GET /api/v1/mandates/{id}
pub async fn get_mandate(
    _actor: Actor,
    pool: web::Data<PgPool>,
    path: web::Path<Uuid>,
) -> Result<impl Responder, CrmError> {
    let mandate = MandateService::get(pool.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(mandate))
}

/// PUT /api/v1/mandates/{id}
pub async fn update_mandate(
    _actor: Actor,
    pool: web::Data<PgPool>,
    publisher: web::Data<EventPublisher>,
    path: web::Path<Uuid>,
    body: web::Json<UpdateMandateRequest>,
) -> Result<impl Responder, CrmError> {
    let mandate =
        MandateService::update(pool.get_ref(), publisher.get_ref(), path.into_inner(), body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(mandate))
}

/// POST /api/v1/mandates/{id}/status
/// Lifecycle transition; 422 when the move is not allowed
pub async fn change_status(
    actor: Actor,
    pool: web::Data<PgPool>,
    publisher: web::Data<EventPublisher>,
    path: web::Path<Uuid>,
    body: web::Json<MandateStatusRequest>,
) -> Result<impl Responder, CrmError> {
    let mandate = MandateService::change_status(
        pool.get_ref(),
        publisher.get_ref(),
        &actor.name,
        path.into_inner(),
        body.into_inner(),
    )
    .await?;
    Ok(HttpResponse::Ok().json(mandate))
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/mandates")
            .route("", web::post().to(create_mandate))
            .route("", web::get().to(search_mandates))
            .route("/{id}", web::get().to(get_mandate))
            .route("/{id}", web::put().to(update_mandate))
            .route("/{id}", web::patch().to(update_mandate))
            .route("/{id}/status", web::post().to(change_status)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{api_request, test_state};
    use actix_web::{http::StatusCode, test, App};
    use serde_json::json;

    #[actix_rt::test]
    async fn test_inverted_period_is_rejected() {
        let state = test_state();
        let app = test::init_service(App::new().configure(|c| state.register(c)).configure(config)).await;

        let req = api_request(test::TestRequest::post().uri("/mandates"))
            .set_json(json!({
                "organisation_id": Uuid::new_v4(),
                "title": "Distribution agreement",
                "starts_on": "2024-06-01",
                "ends_on": "2024-01-01"
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
