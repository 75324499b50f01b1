// src/handlers/interactions.rs
// DOCUMENTATION: HTTP handlers for interactions and follow-ups

use crate::errors::CrmError;
use crate::handlers::auth::Actor;
use crate::models::{CreateInteractionRequest, FollowUpQuery, InteractionQuery, UpdateInteractionRequest};
use crate::services::{EventPublisher, InteractionService};
use actix_web::{web, HttpResponse, Responder};
use sqlx::PgPool;
use uuid::Uuid;

/// POST /api/v1/interactions
pub async fn create_interaction(
    actor: Actor,
    pool: web::Data<PgPool>,
    publisher: web::Data<EventPublisher>,
    body: web::Json<CreateInteractionRequest>,
) -> Result<impl Responder, CrmError> {
    let interaction =
        InteractionService::create(pool.get_ref(), publisher.get_ref(), &actor.name, body.into_inner()).await?;
    Ok(HttpResponse::Created().json(interaction))
}

/// GET /api/v1/interactions
pub async fn search_interactions(
    _actor: Actor,
    pool: web::Data<PgPool>,
    query: web::Query<InteractionQuery>,
) -> Result<impl Responder, CrmError> {
    let result = InteractionService::search(pool.get_ref(), query.into_inner()).await?;
    Ok(HttpResponse::Ok().json(result))
}

/// GET /api/v1/interactions/follow-ups?days=&assignee=
pub async fn follow_ups(
    _actor: Actor,
    pool: web::Data<PgPool>,
    query: web::Query<FollowUpQuery>,
) -> Result<impl Responder, CrmError> {
    let interactions = InteractionService::follow_ups(pool.get_ref(), query.into_inner()).await?;
    Ok(HttpResponse::Ok().json(interactions))
}

/// GET /api/v1/interactions/{id}
pub async fn get_interaction(
    _actor: Actor,
    pool: web::Data<PgPool>,
    path: web::Path<Uuid>,
) -> Result<impl Responder, CrmError> {
    let interaction = InteractionService::get(pool.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(interaction))
}

/// PUT /api/v1/interactions/{id}
pub async fn update_interaction(
    actor: Actor,
    pool: web::Data<PgPool>,
    publisher: web::Data<EventPublisher>,
    path: web::Path<Uuid>,
    body: web::Json<UpdateInteractionRequest>,
) -> Result<impl Responder, CrmError> {
    let interaction = InteractionService::update(
        pool.get_ref(),
        publisher.get_ref(),
        &actor.name,
        path.into_inner(),
        body.into_inner(),
    )
    .await?;
    Ok(HttpResponse::Ok().json(interaction))
}

/// DELETE /api/v1/interactions/{id}
pub async fn delete_interaction(
    actor: Actor,
    pool: web::Data<PgPool>,
    publisher: web::Data<EventPublisher>,
    path: web::Path<Uuid>,
) -> Result<impl Responder, CrmError> {
    InteractionService::delete(pool.get_ref(), publisher.get_ref(), &actor.name, path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/interactions")
            .route("", web::post().to(create_interaction))
            .route("", web::get().to(search_interactions))
            .route("/follow-ups", web::get().to(follow_ups))
            .route("/{id}", web::get().to(get_interaction))
            .route("/{id}", web::put().to(update_interaction))
            .route("/{id}", web::patch().to(update_interaction))
            .route("/{id}", web::delete().to(delete_interaction)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{api_request, test_state};
    use actix_web::{http::StatusCode, test, App};
    use serde_json::json;

    #[actix_rt::test]
    async fn test_interaction_needs_an_anchor() {
        let state = test_state();
        let app = test::init_service(App::new().configure(|c| state.register(c)).configure(config)).await;

        let req = api_request(test::TestRequest::post().uri("/interactions"))
            .set_json(json!({ "kind": "call", "title": "Intro call" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["code"], "INVALID_INPUT");
    }

    #[actix_rt::test]
    async fn test_follow_up_horizon_is_bounded() {
        let state = test_state();
        let app = test::init_service(App::new().configure(|c| state.register(c)).configure(config)).await;

        let req = api_request(test::TestRequest::get().uri("/interactions/follow-ups?days=-2")).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
