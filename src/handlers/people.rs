// src/handlers/people.rs
// DOCUMENTATION: HTTP handlers for people, their organisation links and RGPD requests

use crate::errors::CrmError;
use crate::handlers::auth::Actor;
use crate::models::{ConsentRequest, CreatePersonRequest, LinkOrganisationRequest, PersonQuery, UpdatePersonRequest};
use crate::services::{ComplianceService, EventPublisher, PersonService};
use actix_web::{web, HttpResponse, Responder};
use sqlx::PgPool;
use uuid::Uuid;

/// POST /api/v1/people
pub async fn create_person(
    actor: Actor,
    pool: web::Data<PgPool>,
    publisher: web::Data<EventPublisher>,
    body: web::Json<CreatePersonRequest>,
) -> Result<impl Responder, CrmError> {
    let person = PersonService::create(pool.get_ref(), publisher.get_ref(), &actor.name, body.into_inner()).await?;
    Ok(HttpResponse::Created().json(person))
}

/// GET /api/v1/people
pub async fn search_people(
    _actor: Actor,
    pool: web::Data<PgPool>,
    query: web::Query<PersonQuery>,
) -> Result<impl Responder, CrmError> {
    let result = PersonService::search(pool.get_ref(), query.into_inner()).await?;
    Ok(HttpResponse::Ok().json(result))
}

/// GET /api/v1/people/{id}
pub async fn get_person(
    _actor: Actor,
    pool: web::Data<PgPool>,
    path: web::Path<Uuid>,
) -> Result<impl Responder, CrmError> {
    let detail = PersonService::get(pool.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(detail))
}

/// PUT /api/v1/people/{id}
pub async fn update_person(
    actor: Actor,
    pool: web::Data<PgPool>,
    publisher: web::Data<EventPublisher>,
    path: web::Path<Uuid>,
    body: web::Json<UpdatePersonRequest>,
) -> Result<impl Responder, CrmError> {
    let person = PersonService::update(
        pool.get_ref(),
        publisher.get_ref(),
        &actor.name,
        path.into_inner(),
        body.into_inner(),
    )
    .await?;
    Ok(HttpResponse::Ok().json(person))
}

/// DELETE /api/v1/people/{id}
pub async fn delete_person(
    actor: Actor,
    pool: web::Data<PgPool>,
    publisher: web::Data<EventPublisher>,
    path: web::Path<Uuid>,
) -> Result<impl Responder, CrmError> {
    PersonService::delete(pool.get_ref(), publisher.get_ref(), &actor.name, path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// POST /api/v1/people/{id}/organisations/{organisation_id}
pub async fn link_organisation(
    _actor: Actor,
    pool: web::Data<PgPool>,
    publisher: web::Data<EventPublisher>,
    path: web::Path<(Uuid, Uuid)>,
    body: Option<web::Json<LinkOrganisationRequest>>,
) -> Result<impl Responder, CrmError> {
    let (person_id, organisation_id) = path.into_inner();
    let req = body.map(web::Json::into_inner).unwrap_or_default();

    let organisations =
        PersonService::link_organisation(pool.get_ref(), publisher.get_ref(), person_id, organisation_id, req)
            .await?;
    Ok(HttpResponse::Ok().json(organisations))
}

/// DELETE /api/v1/people/{id}/organisations/{organisation_id}
pub async fn unlink_organisation(
    _actor: Actor,
    pool: web::Data<PgPool>,
    publisher: web::Data<EventPublisher>,
    path: web::Path<(Uuid, Uuid)>,
) -> Result<impl Responder, CrmError> {
    let (person_id, organisation_id) = path.into_inner();
    PersonService::unlink_organisation(pool.get_ref(), publisher.get_ref(), person_id, organisation_id).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// GET /api/v1/people/{id}/export
/// Right of access
pub async fn export_person(
    actor: Actor,
    pool: web::Data<PgPool>,
    path: web::Path<Uuid>,
) -> Result<impl Responder, CrmError> {
    let export = ComplianceService::export_person(pool.get_ref(), &actor.name, actor.ip, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(export))
}

/// POST /api/v1/people/{id}/anonymize
/// Right to erasure
pub async fn anonymize_person(
    actor: Actor,
    pool: web::Data<PgPool>,
    publisher: web::Data<EventPublisher>,
    path: web::Path<Uuid>,
) -> Result<impl Responder, CrmError> {
    let person = ComplianceService::anonymize_person(
        pool.get_ref(),
        publisher.get_ref(),
        &actor.name,
        actor.ip,
        path.into_inner(),
    )
    .await?;
    Ok(HttpResponse::Ok().json(person))
}

/// POST /api/v1/people/{id}/consent
pub async fn set_consent(
    actor: Actor,
    pool: web::Data<PgPool>,
    path: web::Path<Uuid>,
    body: web::Json<ConsentRequest>,
) -> Result<impl Responder, CrmError> {
    let person = ComplianceService::set_consent(
        pool.get_ref(),
        &actor.name,
        actor.ip,
        path.into_inner(),
        body.email_opt_out,
    )
    .await?;
    Ok(HttpResponse::Ok().json(person))
}

/// Configuration for people routes
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/people")
            .route("", web::post().to(create_person))
            .route("", web::get().to(search_people))
            .route("/{id}", web::get().to(get_person))
            .route("/{id}", web::put().to(update_person))
            .route("/{id}", web::patch().to(update_person))
            .route("/{id}", web::delete().to(delete_person))
            .route("/{id}/organisations/{organisation_id}", web::post().to(link_organisation))
            .route("/{id}/organisations/{organisation_id}", web::delete().to(unlink_organisation))
            .route("/{id}/export", web::get().to(export_person))
            .route("/{id}/anonymize", web::post().to(anonymize_person))
            .route("/{id}/consent", web::post().to(set_consent)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{api_request, test_state};
    use actix_web::{http::StatusCode, test, App};
    use serde_json::json;

    #[actix_rt::test]
    async fn test_create_rejects_bad_email() {
        let state = test_state();
        let app = test::init_service(App::new().configure(|c| state.register(c)).configure(config)).await;

        let req = api_request(test::TestRequest::post().uri("/people"))
            .set_json(json!({ "first_name": "Ana", "last_name": "Ruiz", "email": "not-an-email" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_rt::test]
    async fn test_wrong_token_is_forbidden() {
        let state = test_state();
        let app = test::init_service(App::new().configure(|c| state.register(c)).configure(config)).await;

        let req = test::TestRequest::post()
            .uri(&format!("/people/{}/anonymize", Uuid::new_v4()))
            .insert_header(("Authorization", "Bearer wrong"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }
}
