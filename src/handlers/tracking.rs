// src/handlers/tracking.rs
// DOCUMENTATION: Public campaign tracking endpoints (no bearer token)
// PURPOSE: Open pixel, click redirect and unsubscribe link embedded in campaign emails

use crate::errors::CrmError;
use crate::handlers::auth::client_ip;
use crate::services::{CampaignService, EventPublisher};
use actix_web::{http::header, web, HttpRequest, HttpResponse, Responder};
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

/// Transparent 1x1 GIF
const PIXEL_GIF: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00, 0x00,
    0xff, 0xff, 0xff, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00, 0x00, 0x00,
    0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3b,
];

#[derive(Debug, Deserialize)]
pub struct ClickQuery {
    pub url: String,
}

/// GET /t/open/{recipient_id}
/// Always answers with the pixel so mail clients never show a broken image
pub async fn track_open(pool: web::Data<PgPool>, path: web::Path<Uuid>) -> impl Responder {
    let recipient_id = path.into_inner();
    match CampaignService::track_open(pool.get_ref(), recipient_id).await {
        Ok(true) => log::debug!("First open for recipient {}", recipient_id),
        Ok(false) => {}
        Err(e) => log::warn!("Open tracking failed for {}: {}", recipient_id, e),
    }

    HttpResponse::Ok()
        .content_type("image/gif")
        .insert_header((header::CACHE_CONTROL, "no-store, no-cache, must-revalidate"))
        .body(PIXEL_GIF)
}

/// GET /t/click/{recipient_id}?url=
pub async fn track_click(
    pool: web::Data<PgPool>,
    path: web::Path<Uuid>,
    query: web::Query<ClickQuery>,
) -> Result<impl Responder, CrmError> {
    let target = CampaignService::track_click(pool.get_ref(), path.into_inner(), &query.url).await?;
    Ok(HttpResponse::Found()
        .insert_header((header::LOCATION, target))
        .finish())
}

/// GET|POST /t/unsubscribe/{recipient_id}
/// POST serves one-click unsubscribe from mail clients
pub async fn unsubscribe(
    req: HttpRequest,
    pool: web::Data<PgPool>,
    publisher: web::Data<EventPublisher>,
    path: web::Path<Uuid>,
) -> Result<impl Responder, CrmError> {
    let recipient = CampaignService::unsubscribe(
        pool.get_ref(),
        publisher.get_ref(),
        path.into_inner(),
        client_ip(&req),
    )
    .await?;

    log::debug!("Unsubscribe page served for recipient {}", recipient.id);
    Ok(HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(unsubscribe_page()))
}

fn unsubscribe_page() -> &'static str {
    "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>Unsubscribed</title></head>\
     <body><h1>You have been unsubscribed</h1>\
     <p>You will no longer receive these emails.</p></body></html>"
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/t")
            .route("/open/{recipient_id}", web::get().to(track_open))
            .route("/click/{recipient_id}", web::get().to(track_click))
            .route("/unsubscribe/{recipient_id}", web::get().to(unsubscribe))
            .route("/unsubscribe/{recipient_id}", web::post().to(unsubscribe)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::test_state;
    use actix_web::{http::StatusCode, test, App};

    #[actix_rt::test]
    async fn test_pixel_is_a_gif() {
        assert!(PIXEL_GIF.starts_with(b"GIF89a"));
        assert_eq!(PIXEL_GIF.last(), Some(&0x3b));
    }

    #[actix_rt::test]
    async fn test_click_refuses_non_http_targets() {
        let state = test_state();
        let app = test::init_service(App::new().configure(|c| state.register(c)).configure(config)).await;

        let req = test::TestRequest::get()
            .uri(&format!("/t/click/{}?url=javascript%3Aalert(1)", Uuid::new_v4()))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_rt::test]
    async fn test_click_requires_target() {
        let state = test_state();
        let app = test::init_service(App::new().configure(|c| state.register(c)).configure(config)).await;

        let req = test::TestRequest::get()
            .uri(&format!("/t/click/{}", Uuid::new_v4()))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
