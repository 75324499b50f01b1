// src/handlers/compliance.rs
// DOCUMENTATION: Read access to the RGPD audit trail

use crate::errors::CrmError;
use crate::handlers::auth::Actor;
use crate::models::ComplianceQuery;
use crate::services::ComplianceService;
use actix_web::{web, HttpResponse, Responder};
use sqlx::PgPool;

/// GET /api/v1/compliance/logs?entity_type=&entity_id=&action=&actor=
/// Newest first
pub async fn list_logs(
    _actor: Actor,
    pool: web::Data<PgPool>,
    query: web::Query<ComplianceQuery>,
) -> Result<impl Responder, CrmError> {
    let logs = ComplianceService::list(pool.get_ref(), query.into_inner()).await?;
    Ok(HttpResponse::Ok().json(logs))
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/compliance").route("/logs", web::get().to(list_logs)));
}
