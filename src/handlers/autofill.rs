// src/handlers/autofill.rs
// DOCUMENTATION: HTTP handlers for AI-assisted contact capture

use crate::errors::CrmError;
use crate::handlers::auth::Actor;
use crate::models::{AutofillRequest, ExtractRequest};
use crate::services::{AutofillService, ContactExtractor, EventPublisher};
use actix_web::{web, HttpResponse, Responder};
use sqlx::PgPool;

/// POST /api/v1/autofill/extract
/// Fields only, nothing is looked up or written
pub async fn extract(
    _actor: Actor,
    extractor: web::Data<ContactExtractor>,
    body: web::Json<ExtractRequest>,
) -> Result<impl Responder, CrmError> {
    let response = AutofillService::extract(extractor.get_ref(), body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(response))
}

/// POST /api/v1/autofill/preview
/// Fields plus the create/link/skip decisions, without writing anything
pub async fn preview(
    _actor: Actor,
    pool: web::Data<PgPool>,
    extractor: web::Data<ContactExtractor>,
    body: web::Json<AutofillRequest>,
) -> Result<impl Responder, CrmError> {
    let preview = AutofillService::preview(pool.get_ref(), extractor.get_ref(), body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(preview))
}

/// POST /api/v1/autofill/apply
pub async fn apply(
    actor: Actor,
    pool: web::Data<PgPool>,
    publisher: web::Data<EventPublisher>,
    extractor: web::Data<ContactExtractor>,
    body: web::Json<AutofillRequest>,
) -> Result<impl Responder, CrmError> {
    let result = AutofillService::apply(
        pool.get_ref(),
        publisher.get_ref(),
        extractor.get_ref(),
        &actor.name,
        actor.ip,
        body.into_inner(),
    )
    .await?;
    Ok(HttpResponse::Ok().json(result))
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/autofill")
            .route("/extract", web::post().to(extract))
            .route("/preview", web::post().to(preview))
            .route("/apply", web::post().to(apply)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{api_request, test_state};
    use actix_web::{http::StatusCode, test, App};
    use serde_json::json;

    #[actix_rt::test]
    async fn test_extract_falls_back_to_heuristics() {
        let state = test_state();
        let app = test::init_service(App::new().configure(|c| state.register(c)).configure(config)).await;

        let req = api_request(test::TestRequest::post().uri("/autofill/extract"))
            .set_json(json!({ "text": "Best regards,\nMarie Dupont\nmarie.dupont@acme-capital.fr" }))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["source"], "heuristic");
        assert_eq!(body["fields"]["email"], "marie.dupont@acme-capital.fr");
    }

    #[actix_rt::test]
    async fn test_preview_needs_text_or_fields() {
        let state = test_state();
        let app = test::init_service(App::new().configure(|c| state.register(c)).configure(config)).await;

        let req = api_request(test::TestRequest::post().uri("/autofill/preview"))
            .set_json(json!({ "source_label": "manual" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
