// src/handlers/dashboard.rs
// DOCUMENTATION: Aggregated counters for the CRM home screen

use crate::db::{CampaignRepository, InteractionRepository, MandateRepository, OrganisationRepository, PersonRepository};
use crate::errors::CrmError;
use crate::handlers::auth::Actor;
use actix_web::{web, HttpResponse, Responder};
use serde::Serialize;
use sqlx::PgPool;
use std::collections::BTreeMap;

#[derive(Debug, Serialize)]
pub struct Dashboard {
    pub organisations_by_category: BTreeMap<String, i64>,
    pub organisations_total: i64,
    pub people: i64,
    pub interactions_last_30_days: i64,
    pub open_follow_ups: i64,
    pub mandates_by_status: BTreeMap<String, i64>,
    pub campaigns_by_status: BTreeMap<String, i64>,
    pub generated_at: chrono::DateTime<chrono::Utc>,
}

/// GET /api/v1/dashboard
pub async fn dashboard(_actor: Actor, pool: web::Data<PgPool>) -> Result<impl Responder, CrmError> {
    let pool = pool.get_ref();

    let organisations_by_category: BTreeMap<String, i64> =
        OrganisationRepository::count_by_category(pool).await?.into_iter().collect();
    let people = PersonRepository::count_active(pool).await?;
    let (interactions_last_30_days, open_follow_ups) = InteractionRepository::activity_counts(pool).await?;
    let mandates_by_status = MandateRepository::count_by_status(pool).await?.into_iter().collect();
    let campaigns_by_status = CampaignRepository::count_by_status(pool).await?.into_iter().collect();

    Ok(HttpResponse::Ok().json(Dashboard {
        organisations_total: organisations_by_category.values().sum(),
        organisations_by_category,
        people,
        interactions_last_30_days,
        open_follow_ups,
        mandates_by_status,
        campaigns_by_status,
        generated_at: chrono::Utc::now(),
    }))
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.route("/dashboard", web::get().to(dashboard));
}
