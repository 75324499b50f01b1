// src/db/person_repository.rs
// DOCUMENTATION: Database access layer for people and their organisation links

use crate::errors::CrmError;
use crate::models::*;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

pub struct PersonRepository;

impl PersonRepository {
    /// Insert a person and return the created record
    /// DOCUMENTATION: a duplicate email surfaces as CrmError::AlreadyExists
    pub async fn create<'e, E>(executor: E, req: &CreatePersonRequest) -> Result<Person, CrmError>
    where
        E: sqlx::Executor<'e, Database = Postgres>,
    {
        let person = sqlx::query_as::<_, Person>(
            r#"
            INSERT INTO people (
                first_name, last_name, email, phone, mobile, job_title,
                linkedin_url, country_code, language
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(req.first_name.trim())
        .bind(req.last_name.trim())
        .bind(req.email.as_ref().map(|e| e.trim().to_lowercase()))
        .bind(&req.phone)
        .bind(&req.mobile)
        .bind(&req.job_title)
        .bind(&req.linkedin_url)
        .bind(req.country_code.as_ref().map(|c| c.to_uppercase()))
        .bind(&req.language)
        .fetch_one(executor)
        .await
        .map_err(|e| CrmError::from_db("Failed to create person", e))?;

        log::info!("Created person {}", person.id);
        Ok(person)
    }

    /// Retrieve active person by ID
    pub async fn get_by_id(pool: &PgPool, id: Uuid) -> Result<Person, CrmError> {
        sqlx::query_as::<_, Person>("SELECT * FROM people WHERE id = $1 AND is_active = true")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(|e| CrmError::from_db("Failed to fetch person", e))?
            .ok_or_else(|| {
                log::warn!("Person not found: {}", id);
                CrmError::NotFound(format!("person {}", id))
            })
    }

    /// Retrieve a person whatever its state (used by RGPD flows)
    pub async fn get_any(pool: &PgPool, id: Uuid) -> Result<Person, CrmError> {
        sqlx::query_as::<_, Person>("SELECT * FROM people WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(|e| CrmError::from_db("Failed to fetch person", e))?
            .ok_or_else(|| CrmError::NotFound(format!("person {}", id)))
    }

    /// Search people by name/email and organisation
    pub async fn search(pool: &PgPool, query: &PersonQuery) -> Result<(Vec<Person>, i64), CrmError> {
        let params = query.page_params();

        let mut count_qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM people p");
        Self::push_filters(&mut count_qb, query);
        let total: i64 = count_qb
            .build_query_scalar()
            .fetch_one(pool)
            .await
            .map_err(|e| CrmError::from_db("Person count query failed", e))?;

        let mut qb = QueryBuilder::<Postgres>::new("SELECT p.* FROM people p");
        Self::push_filters(&mut qb, query);
        qb.push(" ORDER BY LOWER(p.last_name), LOWER(p.first_name) LIMIT ")
            .push_bind(params.limit)
            .push(" OFFSET ")
            .push_bind(params.offset());

        let people = qb
            .build_query_as::<Person>()
            .fetch_all(pool)
            .await
            .map_err(|e| CrmError::from_db("Person search query failed", e))?;

        Ok((people, total))
    }

    fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &PersonQuery) {
        qb.push(" WHERE p.is_active = true");

        if let Some(q) = query.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            let pattern = format!("%{}%", q);
            qb.push(" AND (p.first_name ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR p.last_name ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR p.email ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR (p.first_name || ' ' || p.last_name) ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
        if let Some(org_id) = query.organisation_id {
            qb.push(" AND EXISTS (SELECT 1 FROM person_organisations po WHERE po.person_id = p.id AND po.organisation_id = ")
                .push_bind(org_id)
                .push(")");
        }
    }

    /// Partial update
    pub async fn update(pool: &PgPool, id: Uuid, req: &UpdatePersonRequest) -> Result<Person, CrmError> {
        sqlx::query_as::<_, Person>(
            r#"
            UPDATE people
            SET first_name = COALESCE($1, first_name),
                last_name = COALESCE($2, last_name),
                email = COALESCE($3, email),
                phone = COALESCE($4, phone),
                mobile = COALESCE($5, mobile),
                job_title = COALESCE($6, job_title),
                linkedin_url = COALESCE($7, linkedin_url),
                country_code = COALESCE($8, country_code),
                language = COALESCE($9, language),
                updated_at = NOW()
            WHERE id = $10 AND is_active = true
            RETURNING *
            "#,
        )
        .bind(req.first_name.as_deref().map(str::trim))
        .bind(req.last_name.as_deref().map(str::trim))
        .bind(req.email.as_ref().map(|e| e.trim().to_lowercase()))
        .bind(&req.phone)
        .bind(&req.mobile)
        .bind(&req.job_title)
        .bind(&req.linkedin_url)
        .bind(req.country_code.as_ref().map(|c| c.to_uppercase()))
        .bind(&req.language)
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| CrmError::from_db("Failed to update person", e))?
        .ok_or_else(|| CrmError::NotFound(format!("person {}", id)))
    }

    /// Soft delete
    pub async fn soft_delete(pool: &PgPool, id: Uuid) -> Result<(), CrmError> {
        let rows = sqlx::query(
            "UPDATE people SET is_active = false, updated_at = NOW() WHERE id = $1 AND is_active = true",
        )
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| CrmError::from_db("Failed to delete person", e))?
        .rows_affected();

        if rows == 0 {
            return Err(CrmError::NotFound(format!("person {}", id)));
        }

        log::info!("Deleted person: {}", id);
        Ok(())
    }

    /// Create or refresh the person-organisation link
    /// DOCUMENTATION: a primary link clears the person's other primary flags
    pub async fn link_organisation(
        pool: &PgPool,
        person_id: Uuid,
        organisation_id: Uuid,
        req: &LinkOrganisationRequest,
    ) -> Result<bool, CrmError> {
        let mut tx = pool
            .begin()
            .await
            .map_err(|e| CrmError::from_db("Failed to open transaction", e))?;

        let inserted = Self::link_organisation_in(&mut tx, person_id, organisation_id, req).await?;

        tx.commit()
            .await
            .map_err(|e| CrmError::from_db("Failed to commit link", e))?;

        Ok(inserted)
    }

    /// Same as `link_organisation`, inside a transaction owned by the caller
    pub async fn link_organisation_in(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        person_id: Uuid,
        organisation_id: Uuid,
        req: &LinkOrganisationRequest,
    ) -> Result<bool, CrmError> {
        if req.is_primary {
            sqlx::query("UPDATE person_organisations SET is_primary = false WHERE person_id = $1 AND organisation_id <> $2")
                .bind(person_id)
                .bind(organisation_id)
                .execute(&mut **tx)
                .await
                .map_err(|e| CrmError::from_db("Failed to reset primary link", e))?;
        }

        let (inserted,): (bool,) = sqlx::query_as(
            r#"
            INSERT INTO person_organisations (person_id, organisation_id, job_title, work_email, is_primary)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (person_id, organisation_id) DO UPDATE
            SET job_title = COALESCE(EXCLUDED.job_title, person_organisations.job_title),
                work_email = COALESCE(EXCLUDED.work_email, person_organisations.work_email),
                is_primary = EXCLUDED.is_primary OR person_organisations.is_primary
            RETURNING (xmax = 0)
            "#,
        )
        .bind(person_id)
        .bind(organisation_id)
        .bind(&req.job_title)
        .bind(req.work_email.as_ref().map(|e| e.to_lowercase()))
        .bind(req.is_primary)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| CrmError::from_db("Failed to link person to organisation", e))?;

        log::info!(
            "Linked person {} to organisation {} (new: {})",
            person_id,
            organisation_id,
            inserted
        );
        Ok(inserted)
    }

    pub async fn unlink_organisation(pool: &PgPool, person_id: Uuid, organisation_id: Uuid) -> Result<(), CrmError> {
        let rows = sqlx::query("DELETE FROM person_organisations WHERE person_id = $1 AND organisation_id = $2")
            .bind(person_id)
            .bind(organisation_id)
            .execute(pool)
            .await
            .map_err(|e| CrmError::from_db("Failed to unlink person", e))?
            .rows_affected();

        if rows == 0 {
            return Err(CrmError::NotFound(format!(
                "link between person {} and organisation {}",
                person_id, organisation_id
            )));
        }
        Ok(())
    }

    pub async fn organisations_of(pool: &PgPool, person_id: Uuid) -> Result<Vec<PersonOrganisation>, CrmError> {
        sqlx::query_as::<_, PersonOrganisation>(
            r#"
            SELECT po.organisation_id, o.name AS organisation_name, po.job_title,
                   po.work_email, po.is_primary, po.created_at
            FROM person_organisations po
            JOIN organisations o ON o.id = po.organisation_id
            WHERE po.person_id = $1
            ORDER BY po.is_primary DESC, o.name
            "#,
        )
        .bind(person_id)
        .fetch_all(pool)
        .await
        .map_err(|e| CrmError::from_db("Failed to fetch person organisations", e))
    }

    /// IDs of the organisations a set of people belong to
    pub async fn organisation_ids_of(pool: &PgPool, person_ids: &[Uuid]) -> Result<Vec<(Uuid, Uuid)>, CrmError> {
        if person_ids.is_empty() {
            return Ok(Vec::new());
        }
        sqlx::query_as::<_, (Uuid, Uuid)>(
            "SELECT person_id, organisation_id FROM person_organisations WHERE person_id = ANY($1)",
        )
        .bind(person_ids)
        .fetch_all(pool)
        .await
        .map_err(|e| CrmError::from_db("Failed to fetch organisation links", e))
    }

    /// Possible duplicates for the autofill engine: same email, or same last name
    pub async fn find_candidates(
        pool: &PgPool,
        email: Option<&str>,
        last_name: Option<&str>,
    ) -> Result<Vec<Person>, CrmError> {
        if email.is_none() && last_name.is_none() {
            return Ok(Vec::new());
        }

        sqlx::query_as::<_, Person>(
            r#"
            SELECT * FROM people
            WHERE is_active = true AND is_anonymized = false
              AND (($1::text IS NOT NULL AND LOWER(email) = LOWER($1))
                   OR ($2::text IS NOT NULL AND LOWER(last_name) = LOWER($2)))
            ORDER BY updated_at DESC
            LIMIT 25
            "#,
        )
        .bind(email)
        .bind(last_name)
        .fetch_all(pool)
        .await
        .map_err(|e| CrmError::from_db("Person candidate lookup failed", e))
    }

    pub async fn set_email_opt_out(pool: &PgPool, id: Uuid, opt_out: bool) -> Result<Person, CrmError> {
        sqlx::query_as::<_, Person>(
            r#"
            UPDATE people
            SET email_opt_out = $1,
                opted_out_at = CASE WHEN $1 THEN COALESCE(opted_out_at, NOW()) ELSE NULL END,
                updated_at = NOW()
            WHERE id = $2
            RETURNING *
            "#,
        )
        .bind(opt_out)
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| CrmError::from_db("Failed to update consent", e))?
        .ok_or_else(|| CrmError::NotFound(format!("person {}", id)))
    }

    /// Erase personal data in place
    /// DOCUMENTATION: person row, link work emails and campaign recipient
    /// addresses are overwritten in one transaction; returns false when
    /// the person was already anonymised
    pub async fn anonymize(pool: &PgPool, id: Uuid) -> Result<bool, CrmError> {
        let mut tx = pool
            .begin()
            .await
            .map_err(|e| CrmError::from_db("Failed to open transaction", e))?;

        let rows = sqlx::query(
            r#"
            UPDATE people
            SET first_name = $1,
                last_name = $1,
                email = NULL,
                phone = NULL,
                mobile = NULL,
                linkedin_url = NULL,
                job_title = NULL,
                email_opt_out = true,
                opted_out_at = COALESCE(opted_out_at, NOW()),
                is_anonymized = true,
                updated_at = NOW()
            WHERE id = $2 AND is_anonymized = false
            "#,
        )
        .bind(ANONYMIZED_LABEL)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| CrmError::from_db("Failed to anonymise person", e))?
        .rows_affected();

        if rows == 0 {
            tx.rollback()
                .await
                .map_err(|e| CrmError::from_db("Failed to roll back", e))?;
            return Ok(false);
        }

        sqlx::query("UPDATE person_organisations SET work_email = NULL WHERE person_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| CrmError::from_db("Failed to clear link emails", e))?;

        sqlx::query(
            "UPDATE campaign_recipients SET email = 'redacted+' || id::text || '@invalid' WHERE person_id = $1",
        )
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| CrmError::from_db("Failed to redact recipient emails", e))?;

        tx.commit()
            .await
            .map_err(|e| CrmError::from_db("Failed to commit anonymisation", e))?;

        log::info!("Anonymised person {}", id);
        Ok(true)
    }

    /// People untouched since `cutoff` and without any interaction since then
    pub async fn stale_people(pool: &PgPool, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>, CrmError> {
        sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT p.id FROM people p
            WHERE p.is_anonymized = false
              AND p.updated_at < $1
              AND NOT EXISTS (
                  SELECT 1 FROM interaction_participants ip
                  JOIN interactions i ON i.id = ip.interaction_id
                  WHERE ip.person_id = p.id AND i.occurred_at >= $1
              )
            ORDER BY p.updated_at
            "#,
        )
        .bind(cutoff)
        .fetch_all(pool)
        .await
        .map_err(|e| CrmError::from_db("Retention candidate lookup failed", e))
    }

    pub async fn count_active(pool: &PgPool) -> Result<i64, CrmError> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM people WHERE is_active = true")
            .fetch_one(pool)
            .await
            .map_err(|e| CrmError::from_db("Failed to count people", e))
    }
}
