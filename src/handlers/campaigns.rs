// src/handlers/campaigns.rs
// DOCUMENTATION: HTTP handlers for email campaigns

use crate::errors::CrmError;
use crate::handlers::auth::Actor;
use crate::models::{
    AddRecipientsRequest, CampaignQuery, CreateCampaignRequest, RecipientQuery, ScheduleCampaignRequest,
    UpdateCampaignRequest,
};
use crate::services::{CampaignSender, CampaignService};
use actix_web::{web, HttpResponse, Responder};
use sqlx::PgPool;
use uuid::Uuid;

/// POST /api/v1/campaigns
pub async fn create_campaign(
    actor: Actor,
    pool: web::Data<PgPool>,
    body: web::Json<CreateCampaignRequest>,
) -> Result<impl Responder, CrmError> {
    let campaign = CampaignService::create(pool.get_ref(), &actor.name, body.into_inner()).await?;
    Ok(HttpResponse::Created().json(campaign))
}

/// GET /api/v1/campaigns
pub async fn search_campaigns(
    _actor: Actor,
    pool: web::Data<PgPool>,
    query: web::Query<CampaignQuery>,
) -> Result<impl Responder, CrmError> {
    let result = CampaignService::search(pool.get_ref(), query.into_inner()).await?;
    Ok(HttpResponse::Ok().json(result))
}

/// GET /api/v1/campaigns/{id}
pub async fn get_campaign(
    _actor: Actor,
    pool: web::Data<PgPool>,
    path: web::Path<Uuid>,
) -> Result<impl Responder, CrmError> {
    let campaign = CampaignService::get(pool.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(campaign))
}

/// PUT /api/v1/campaigns/{id}
/// Drafts only
pub async fn update_campaign(
    _actor: Actor,
    pool: web::Data<PgPool>,
    path: web::Path<Uuid>,
    body: web::Json<UpdateCampaignRequest>,
) -> Result<impl Responder, CrmError> {
    let campaign = CampaignService::update(pool.get_ref(), path.into_inner(), body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(campaign))
}

/// DELETE /api/v1/campaigns/{id}
pub async fn delete_campaign(
    _actor: Actor,
    pool: web::Data<PgPool>,
    path: web::Path<Uuid>,
) -> Result<impl Responder, CrmError> {
    CampaignService::delete(pool.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// POST /api/v1/campaigns/{id}/recipients
pub async fn add_recipients(
    _actor: Actor,
    pool: web::Data<PgPool>,
    path: web::Path<Uuid>,
    body: web::Json<AddRecipientsRequest>,
) -> Result<impl Responder, CrmError> {
    let response = CampaignService::add_recipients(pool.get_ref(), path.into_inner(), body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(response))
}

/// GET /api/v1/campaigns/{id}/recipients
pub async fn list_recipients(
    _actor: Actor,
    pool: web::Data<PgPool>,
    path: web::Path<Uuid>,
    query: web::Query<RecipientQuery>,
) -> Result<impl Responder, CrmError> {
    let result = CampaignService::recipients(pool.get_ref(), path.into_inner(), query.into_inner()).await?;
    Ok(HttpResponse::Ok().json(result))
}

/// POST /api/v1/campaigns/{id}/schedule
pub async fn schedule_campaign(
    _actor: Actor,
    pool: web::Data<PgPool>,
    path: web::Path<Uuid>,
    body: web::Json<ScheduleCampaignRequest>,
) -> Result<impl Responder, CrmError> {
    let campaign = CampaignService::schedule(pool.get_ref(), path.into_inner(), body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(campaign))
}

/// POST /api/v1/campaigns/{id}/cancel
pub async fn cancel_campaign(
    _actor: Actor,
    pool: web::Data<PgPool>,
    path: web::Path<Uuid>,
) -> Result<impl Responder, CrmError> {
    let campaign = CampaignService::cancel(pool.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(campaign))
}

/// POST /api/v1/campaigns/{id}/send
/// Returns 202 once the campaign is `sending`; delivery continues in the background
pub async fn send_campaign(
    actor: Actor,
    sender: web::Data<CampaignSender>,
    path: web::Path<Uuid>,
) -> Result<impl Responder, CrmError> {
    let campaign = sender.start(path.into_inner(), &actor.name).await?;
    Ok(HttpResponse::Accepted().json(campaign))
}

/// GET /api/v1/campaigns/{id}/stats
pub async fn campaign_stats(
    _actor: Actor,
    pool: web::Data<PgPool>,
    path: web::Path<Uuid>,
) -> Result<impl Responder, CrmError> {
    let stats = CampaignService::stats(pool.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(stats))
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/campaigns")
            .route("", web::post().to(create_campaign))
            .route("", web::get().to(search_campaigns))
            .route("/{id}", web::get().to(get_campaign))
            .route("/{id}", web::put().to(update_campaign))
            .route("/{id}", web::patch().to(update_campaign))
            .route("/{id}", web::delete().to(delete_campaign))
            .route("/{id}/recipients", web::post().to(add_recipients))
            .route("/{id}/recipients", web::get().to(list_recipients))
            .route("/{id}/schedule", web::post().to(schedule_campaign))
            .route("/{id}/cancel", web::post().to(cancel_campaign))
            .route("/{id}/send", web::post().to(send_campaign))
            .route("/{id}/stats", web::get().to(campaign_stats)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{api_request, test_state};
    use actix_web::{http::StatusCode, test, App};
    use serde_json::json;

    #[actix_rt::test]
    async fn test_empty_selector_is_rejected() {
        let state = test_state();
        let app = test::init_service(App::new().configure(|c| state.register(c)).configure(config)).await;

        let req = api_request(test::TestRequest::post().uri(&format!("/campaigns/{}/recipients", Uuid::new_v4())))
            .set_json(json!({}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_rt::test]
    async fn test_schedule_in_the_past_is_rejected() {
        let state = test_state();
        let app = test::init_service(App::new().configure(|c| state.register(c)).configure(config)).await;

        let req = api_request(test::TestRequest::post().uri(&format!("/campaigns/{}/schedule", Uuid::new_v4())))
            .set_json(json!({ "scheduled_at": "2020-01-01T09:00:00Z" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
