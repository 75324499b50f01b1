// src/services/organisation_service.rs
// DOCUMENTATION: Business logic for organisations
// PURPOSE: Intermediary between handlers and repository, handles extra logic

use crate::db::OrganisationRepository;
use crate::errors::CrmError;
use crate::models::*;
use crate::services::{dedup, EventPublisher};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

pub struct OrganisationService;

impl OrganisationService {
    /// Create an organisation; its dedup domain comes from the website, else the email
    pub async fn create(
        pool: &PgPool,
        publisher: &EventPublisher,
        actor: &str,
        req: CreateOrganisationRequest,
    ) -> Result<Organisation, CrmError> {
        req.validate()?;
        let domain = dedup::derive_domain(req.website.as_deref(), req.email.as_deref());

        let organisation = OrganisationRepository::create(pool, &req, domain.as_deref()).await?;
        log::info!("Organisation {} created by {}", organisation.id, actor);

        publisher.emit("organisation.created", &organisation);
        Ok(organisation)
    }

    /// Organisation with members and activity counters
    pub async fn get(pool: &PgPool, id: Uuid) -> Result<OrganisationDetail, CrmError> {
        let organisation = OrganisationRepository::get_by_id(pool, id).await?;
        let people = OrganisationRepository::members(pool, id).await?;
        let (mandate_count, interaction_count) = OrganisationRepository::activity_counts(pool, id).await?;

        Ok(OrganisationDetail {
            organisation,
            people,
            mandate_count,
            interaction_count,
        })
    }

    pub async fn search(pool: &PgPool, query: OrganisationQuery) -> Result<Paginated<Organisation>, CrmError> {
        let (organisations, total) = OrganisationRepository::search(pool, &query).await?;
        Ok(Paginated::new(organisations, total, query.page_params()))
    }

    /// Partial update; the domain is recomputed only when website or email change
    pub async fn update(
        pool: &PgPool,
        publisher: &EventPublisher,
        id: Uuid,
        req: UpdateOrganisationRequest,
    ) -> Result<Organisation, CrmError> {
        req.validate()?;
        let domain = dedup::derive_domain(req.website.as_deref(), req.email.as_deref());

        let organisation = OrganisationRepository::update(pool, id, &req, domain.as_deref()).await?;
        publisher.emit("organisation.updated", &organisation);
        Ok(organisation)
    }

    pub async fn delete(pool: &PgPool, publisher: &EventPublisher, actor: &str, id: Uuid) -> Result<(), CrmError> {
        OrganisationRepository::soft_delete(pool, id).await?;
        publisher.emit("organisation.deleted", &json!({ "id": id, "deleted_by": actor }));
        Ok(())
    }
}
