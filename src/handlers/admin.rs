// src/handlers/admin.rs
// DOCUMENTATION: Admin handlers (X-Admin-Token)
// PURPOSE: Table statistics, AI cache maintenance and the retention sweep

use crate::config::Config;
use crate::errors::CrmError;
use crate::handlers::auth::{verify_admin_token, ACTOR_HEADER};
use crate::models::RetentionQuery;
use crate::services::{ComplianceService, ContactExtractor, EventPublisher};
use actix_web::{web, HttpRequest, HttpResponse, Responder};
use serde::Serialize;
use sqlx::PgPool;

/// Tables reported by /admin/stats
const STAT_TABLES: &[&str] = &[
    "organisations",
    "people",
    "person_organisations",
    "interactions",
    "mandates",
    "campaigns",
    "campaign_recipients",
    "compliance_logs",
    "webhooks",
    "webhook_deliveries",
    "notifications",
];

/// Actor recorded in compliance logs for admin-triggered sweeps
const ADMIN_ACTOR: &str = "admin";

#[derive(Debug, Serialize)]
pub struct TableCount {
    pub table: &'static str,
    pub rows: i64,
}

/// GET /admin/stats
/// Row counts per table plus soft-deleted and anonymised records
pub async fn database_stats(
    pool: web::Data<PgPool>,
    config: web::Data<Config>,
    req: HttpRequest,
) -> Result<impl Responder, CrmError> {
    verify_admin_token(&req, &config)?;

    let mut tables = Vec::with_capacity(STAT_TABLES.len());
    for table in STAT_TABLES {
        // Names come from the constant list above, never from the request
        let rows: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(pool.get_ref())
            .await
            .map_err(|e| CrmError::from_db("Failed to count rows", e))?;
        tables.push(TableCount { table, rows: rows.0 });
    }

    let deleted: (i64, i64) = sqlx::query_as(
        r#"
        SELECT
            (SELECT COUNT(*) FROM organisations WHERE is_active = false),
            (SELECT COUNT(*) FROM people WHERE is_active = false)
        "#,
    )
    .fetch_one(pool.get_ref())
    .await
    .map_err(|e| CrmError::from_db("Failed to count deleted rows", e))?;

    let anonymized: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM people WHERE is_anonymized = TRUE")
        .fetch_one(pool.get_ref())
        .await
        .map_err(|e| CrmError::from_db("Failed to count anonymised people", e))?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "tables": tables,
        "deleted_organisations": deleted.0,
        "deleted_people": deleted.1,
        "anonymized_people": anonymized.0,
    })))
}

/// GET /admin/ai-cache
pub async fn cache_stats(
    extractor: web::Data<ContactExtractor>,
    config: web::Data<Config>,
    req: HttpRequest,
) -> Result<impl Responder, CrmError> {
    verify_admin_token(&req, &config)?;

    let stats = extractor.cache().stats().await;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "ai_enabled": extractor.ai_enabled(),
        "cache": stats,
    })))
}

/// DELETE /admin/ai-cache
pub async fn clear_cache(
    extractor: web::Data<ContactExtractor>,
    config: web::Data<Config>,
    req: HttpRequest,
) -> Result<impl Responder, CrmError> {
    verify_admin_token(&req, &config)?;

    let removed = extractor.cache().clear().await;
    log::info!("Admin cleared the AI cache ({} entries)", removed);
    Ok(HttpResponse::Ok().json(serde_json::json!({ "removed": removed })))
}

/// POST /admin/compliance/retention?days=
/// Anonymises people untouched for `days` (default RETENTION_DAYS)
pub async fn retention_sweep(
    pool: web::Data<PgPool>,
    publisher: web::Data<EventPublisher>,
    config: web::Data<Config>,
    req: HttpRequest,
    query: web::Query<RetentionQuery>,
) -> Result<impl Responder, CrmError> {
    verify_admin_token(&req, &config)?;

    let days = query.days.unwrap_or(config.retention_days);
    log::info!("Admin retention sweep requested ({} days)", days);

    let actor = req
        .headers()
        .get(ACTOR_HEADER)
        .and_then(|h| h.to_str().ok())
        .filter(|name| !name.trim().is_empty())
        .unwrap_or(ADMIN_ACTOR)
        .to_string();

    let report = ComplianceService::retention_sweep(pool.get_ref(), publisher.get_ref(), &actor, days).await?;
    Ok(HttpResponse::Ok().json(report))
}

/// Configuration for admin routes
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/admin")
            .route("/stats", web::get().to(database_stats))
            .route("/ai-cache", web::get().to(cache_stats))
            .route("/ai-cache", web::delete().to(clear_cache))
            .route("/compliance/retention", web::post().to(retention_sweep)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::auth::ADMIN_TOKEN_HEADER;
    use crate::handlers::test_support::test_state;
    use actix_web::{http::StatusCode, test, App};

    #[actix_rt::test]
    async fn test_admin_requires_token() {
        let state = test_state();
        let app = test::init_service(App::new().configure(|c| state.register(c)).configure(config)).await;

        let req = test::TestRequest::get().uri("/admin/ai-cache").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::get()
            .uri("/admin/ai-cache")
            .insert_header((ADMIN_TOKEN_HEADER, "nope"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[actix_rt::test]
    async fn test_cache_stats_and_clear() {
        let state = test_state();
        state
            .extractor
            .cache()
            .set("extract:abc".to_string(), "{}".to_string())
            .await;
        let app = test::init_service(App::new().configure(|c| state.register(c)).configure(config)).await;

        let req = test::TestRequest::get()
            .uri("/admin/ai-cache")
            .insert_header((ADMIN_TOKEN_HEADER, "test-admin-token"))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["ai_enabled"], false);
        assert_eq!(body["cache"]["active_entries"], 1);

        let req = test::TestRequest::delete()
            .uri("/admin/ai-cache")
            .insert_header((ADMIN_TOKEN_HEADER, "test-admin-token"))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["removed"], 1);
    }

    #[actix_rt::test]
    async fn test_retention_rejects_zero_days() {
        let state = test_state();
        let app = test::init_service(App::new().configure(|c| state.register(c)).configure(config)).await;

        let req = test::TestRequest::post()
            .uri("/admin/compliance/retention?days=0")
            .insert_header((ADMIN_TOKEN_HEADER, "test-admin-token"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
