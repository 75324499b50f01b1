// src/services/person_service.rs
// DOCUMENTATION: Business logic for people and their organisation links

use crate::db::{ComplianceRepository, OrganisationRepository, PersonRepository};
use crate::errors::CrmError;
use crate::models::*;
use crate::services::EventPublisher;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

pub struct PersonService;

impl PersonService {
    /// Create a person, optionally linked to a primary organisation
    pub async fn create(
        pool: &PgPool,
        publisher: &EventPublisher,
        actor: &str,
        req: CreatePersonRequest,
    ) -> Result<Person, CrmError> {
        req.validate()?;
        if let Some(organisation_id) = req.organisation_id {
            OrganisationRepository::get_by_id(pool, organisation_id).await?;
        }

        let person = PersonRepository::create(pool, &req).await?;

        if let Some(organisation_id) = req.organisation_id {
            let link = LinkOrganisationRequest {
                job_title: req.job_title.clone(),
                work_email: None,
                is_primary: true,
            };
            PersonRepository::link_organisation(pool, person.id, organisation_id, &link).await?;
        }

        log::info!("Person {} created by {}", person.id, actor);
        publisher.emit("person.created", &person);
        Ok(person)
    }

    pub async fn get(pool: &PgPool, id: Uuid) -> Result<PersonDetail, CrmError> {
        let person = PersonRepository::get_by_id(pool, id).await?;
        let organisations = PersonRepository::organisations_of(pool, id).await?;
        Ok(PersonDetail { person, organisations })
    }

    pub async fn search(pool: &PgPool, query: PersonQuery) -> Result<Paginated<Person>, CrmError> {
        let (people, total) = PersonRepository::search(pool, &query).await?;
        Ok(Paginated::new(people, total, query.page_params()))
    }

    /// Partial update; anonymised people are frozen
    /// DOCUMENTATION: the changed field names (not values) go to the audit trail
    pub async fn update(
        pool: &PgPool,
        publisher: &EventPublisher,
        actor: &str,
        id: Uuid,
        req: UpdatePersonRequest,
    ) -> Result<Person, CrmError> {
        req.validate()?;
        Self::ensure_not_anonymized(&PersonRepository::get_by_id(pool, id).await?)?;

        let person = PersonRepository::update(pool, id, &req).await?;

        let changed: Vec<&str> = [
            ("first_name", req.first_name.is_some()),
            ("last_name", req.last_name.is_some()),
            ("email", req.email.is_some()),
            ("phone", req.phone.is_some()),
            ("mobile", req.mobile.is_some()),
            ("job_title", req.job_title.is_some()),
            ("linkedin_url", req.linkedin_url.is_some()),
            ("country_code", req.country_code.is_some()),
            ("language", req.language.is_some()),
        ]
        .iter()
        .filter(|(_, set)| *set)
        .map(|(name, _)| *name)
        .collect();

        let entry = NewComplianceLog::person(actor, ComplianceAction::Update, id)
            .with_details(json!({ "fields": changed }));
        ComplianceRepository::insert(pool, &entry).await?;

        publisher.emit("person.updated", &person);
        Ok(person)
    }

    pub async fn delete(pool: &PgPool, publisher: &EventPublisher, actor: &str, id: Uuid) -> Result<(), CrmError> {
        PersonRepository::soft_delete(pool, id).await?;
        ComplianceRepository::insert(pool, &NewComplianceLog::person(actor, ComplianceAction::Delete, id)).await?;
        publisher.emit("person.deleted", &json!({ "id": id, "deleted_by": actor }));
        Ok(())
    }

    /// Create or refresh a link; returns the person's memberships afterwards
    pub async fn link_organisation(
        pool: &PgPool,
        publisher: &EventPublisher,
        person_id: Uuid,
        organisation_id: Uuid,
        req: LinkOrganisationRequest,
    ) -> Result<Vec<PersonOrganisation>, CrmError> {
        req.validate()?;
        Self::ensure_not_anonymized(&PersonRepository::get_by_id(pool, person_id).await?)?;
        OrganisationRepository::get_by_id(pool, organisation_id).await?;

        let created = PersonRepository::link_organisation(pool, person_id, organisation_id, &req).await?;
        publisher.emit(
            "person.updated",
            &json!({
                "id": person_id,
                "organisation_id": organisation_id,
                "link": if created { "created" } else { "updated" },
            }),
        );

        PersonRepository::organisations_of(pool, person_id).await
    }

    pub async fn unlink_organisation(
        pool: &PgPool,
        publisher: &EventPublisher,
        person_id: Uuid,
        organisation_id: Uuid,
    ) -> Result<(), CrmError> {
        PersonRepository::unlink_organisation(pool, person_id, organisation_id).await?;
        publisher.emit(
            "person.updated",
            &json!({ "id": person_id, "organisation_id": organisation_id, "link": "removed" }),
        );
        Ok(())
    }

    pub fn ensure_not_anonymized(person: &Person) -> Result<(), CrmError> {
        if person.is_anonymized {
            log::warn!("Rejected change to anonymised person {}", person.id);
            return Err(CrmError::Conflict(format!("person {} has been anonymised", person.id)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_anonymized_people_are_frozen() {
        let mut person = Person {
            id: Uuid::new_v4(),
            first_name: ANONYMIZED_LABEL.to_string(),
            last_name: ANONYMIZED_LABEL.to_string(),
            email: None,
            phone: None,
            mobile: None,
            job_title: None,
            linkedin_url: None,
            country_code: None,
            language: None,
            email_opt_out: true,
            opted_out_at: Some(Utc::now()),
            is_anonymized: true,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        assert!(matches!(PersonService::ensure_not_anonymized(&person), Err(CrmError::Conflict(_))));
        person.is_anonymized = false;
        assert!(PersonService::ensure_not_anonymized(&person).is_ok());
    }
}
