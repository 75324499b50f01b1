// src/handlers/organisations.rs
// DOCUMENTATION: HTTP handlers for organisation operations
// PURPOSE: Parse requests, call services, return responses

use crate::errors::CrmError;
use crate::handlers::auth::Actor;
use crate::models::{CreateOrganisationRequest, OrganisationQuery, UpdateOrganisationRequest};
use crate::services::{EventPublisher, OrganisationService};
use actix_web::{web, HttpResponse, Responder};
use sqlx::PgPool;
use uuid::Uuid;

/// POST /api/v1/organisations
pub async fn create_organisation(
    actor: Actor,
    pool: web::Data<PgPool>,
    publisher: web::Data<EventPublisher>,
    body: web::Json<CreateOrganisationRequest>,
) -> Result<impl Responder, CrmError> {
    let organisation =
        OrganisationService::create(pool.get_ref(), publisher.get_ref(), &actor.name, body.into_inner()).await?;
    Ok(HttpResponse::Created().json(organisation))
}

/// GET /api/v1/organisations
/// Search with filters (q, category, country_code, city, pipeline_stage)
pub async fn search_organisations(
    _actor: Actor,
    pool: web::Data<PgPool>,
    query: web::Query<OrganisationQuery>,
) -> Result<impl Responder, CrmError> {
    let result = OrganisationService::search(pool.get_ref(), query.into_inner()).await?;
    Ok(HttpResponse::Ok().json(result))
}

/// GET /api/v1/organisations/{id}
pub async fn get_organisation(
    _actor: Actor,
    pool: web::Data<PgPool>,
    path: web::Path<Uuid>,
) -> Result<impl Responder, CrmError> {
    let detail = OrganisationService::get(pool.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(detail))
}

/// PUT /api/v1/organisations/{id}
pub async fn update_organisation(
    _actor: Actor,
    pool: web::Data<PgPool>,
    publisher: web::Data<EventPublisher>,
    path: web::Path<Uuid>,
    body: web::Json<UpdateOrganisationRequest>,
) -> Result<impl Responder, CrmError> {
    let organisation =
        OrganisationService::update(pool.get_ref(), publisher.get_ref(), path.into_inner(), body.into_inner())
            .await?;
    Ok(HttpResponse::Ok().json(organisation))
}

/// DELETE /api/v1/organisations/{id}
/// Soft delete
pub async fn delete_organisation(
    actor: Actor,
    pool: web::Data<PgPool>,
    publisher: web::Data<EventPublisher>,
    path: web::Path<Uuid>,
) -> Result<impl Responder, CrmError> {
    OrganisationService::delete(pool.get_ref(), publisher.get_ref(), &actor.name, path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// Configuration for organisation routes
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/organisations")
            .route("", web::post().to(create_organisation))
            .route("", web::get().to(search_organisations))
            .route("/{id}", web::get().to(get_organisation))
            .route("/{id}", web::put().to(update_organisation))
            .route("/{id}", web::patch().to(update_organisation))
            .route("/{id}", web::delete().to(delete_organisation)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{api_request, test_state};
    use actix_web::{http::StatusCode, test, App};
    use serde_json::json;

    #[actix_rt::test]
    async fn test_requires_bearer_token() {
        let state = test_state();
        let app = test::init_service(App::new().configure(|c| state.register(c)).configure(config)).await;

        let req = test::TestRequest::get().uri("/organisations").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_rt::test]
    async fn test_create_rejects_invalid_body() {
        let state = test_state();
        let app = test::init_service(App::new().configure(|c| state.register(c)).configure(config)).await;

        let req = api_request(test::TestRequest::post().uri("/organisations"))
            .set_json(json!({ "name": "", "website": "not a url" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }
}
