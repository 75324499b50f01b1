// src/db/organisation_repository.rs
// DOCUMENTATION: Database access layer for organisations
// PURPOSE: All SQL touching organisations and their member links

use crate::errors::CrmError;
use crate::models::*;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

pub struct OrganisationRepository;

impl OrganisationRepository {
    /// Insert organisation and return created record
    /// DOCUMENTATION: `domain` is computed by the service from website/email
    pub async fn create<'e, E>(
        executor: E,
        req: &CreateOrganisationRequest,
        domain: Option<&str>,
    ) -> Result<Organisation, CrmError>
    where
        E: sqlx::Executor<'e, Database = Postgres>,
    {
        let organisation = sqlx::query_as::<_, Organisation>(
            r#"
            INSERT INTO organisations (
                name, category, country_code, city, address, website,
                email, phone, domain, aum, pipeline_stage, notes
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(req.name.trim()) // $1
        .bind(req.category.unwrap_or(OrganisationCategory::Prospect).as_str()) // $2
        .bind(req.country_code.as_ref().map(|c| c.to_uppercase())) // $3
        .bind(&req.city) // $4
        .bind(&req.address) // $5
        .bind(&req.website) // $6
        .bind(&req.email) // $7
        .bind(&req.phone) // $8
        .bind(domain) // $9
        .bind(req.aum) // $10
        .bind(req.pipeline_stage.unwrap_or(PipelineStage::Lead).as_str()) // $11
        .bind(&req.notes) // $12
        .fetch_one(executor)
        .await
        .map_err(|e| CrmError::from_db("Failed to create organisation", e))?;

        log::info!("Created organisation {} ({})", organisation.name, organisation.id);
        Ok(organisation)
    }

    /// Retrieve active organisation by ID
    pub async fn get_by_id(pool: &PgPool, id: Uuid) -> Result<Organisation, CrmError> {
        sqlx::query_as::<_, Organisation>(
            "SELECT * FROM organisations WHERE id = $1 AND is_active = true",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| CrmError::from_db("Failed to fetch organisation", e))?
        .ok_or_else(|| {
            log::warn!("Organisation not found: {}", id);
            CrmError::NotFound(format!("organisation {}", id))
        })
    }

    /// Search organisations with filters
    /// DOCUMENTATION: Returns tuple: (results, total_count) for pagination
    pub async fn search(
        pool: &PgPool,
        query: &OrganisationQuery,
    ) -> Result<(Vec<Organisation>, i64), CrmError> {
        let params = query.page_params();

        let mut count_qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM organisations");
        Self::push_filters(&mut count_qb, query);
        let total: i64 = count_qb
            .build_query_scalar()
            .fetch_one(pool)
            .await
            .map_err(|e| CrmError::from_db("Organisation count query failed", e))?;

        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM organisations");
        Self::push_filters(&mut qb, query);
        qb.push(" ORDER BY LOWER(name) ASC, created_at ASC LIMIT ")
            .push_bind(params.limit)
            .push(" OFFSET ")
            .push_bind(params.offset());

        let organisations = qb
            .build_query_as::<Organisation>()
            .fetch_all(pool)
            .await
            .map_err(|e| CrmError::from_db("Organisation search query failed", e))?;

        log::debug!(
            "Organisation search: {} results, {} total (page {})",
            organisations.len(),
            total,
            params.page
        );

        Ok((organisations, total))
    }

    fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &OrganisationQuery) {
        qb.push(" WHERE is_active = true");

        if let Some(q) = query.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            qb.push(" AND name ILIKE ").push_bind(format!("%{}%", q));
        }
        if let Some(category) = query.category {
            qb.push(" AND category = ").push_bind(category.as_str());
        }
        if let Some(country) = &query.country_code {
            qb.push(" AND country_code = ").push_bind(country.to_uppercase());
        }
        if let Some(city) = &query.city {
            qb.push(" AND city ILIKE ").push_bind(format!("%{}%", city));
        }
        if let Some(stage) = query.pipeline_stage {
            qb.push(" AND pipeline_stage = ").push_bind(stage.as_str());
        }
    }

    /// Update existing organisation
    /// DOCUMENTATION: Partial update - only provided fields are modified
    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        req: &UpdateOrganisationRequest,
        domain: Option<&str>,
    ) -> Result<Organisation, CrmError> {
        sqlx::query_as::<_, Organisation>(
            r#"
            UPDATE organisations
            SET name = COALESCE($1, name),
                category = COALESCE($2, category),
                country_code = COALESCE($3, country_code),
                city = COALESCE($4, city),
                address = COALESCE($5, address),
                website = COALESCE($6, website),
                email = COALESCE($7, email),
                phone = COALESCE($8, phone),
                domain = COALESCE($9, domain),
                aum = COALESCE($10, aum),
                pipeline_stage = COALESCE($11, pipeline_stage),
                notes = COALESCE($12, notes),
                updated_at = NOW()
            WHERE id = $13 AND is_active = true
            RETURNING *
            "#,
        )
        .bind(req.name.as_deref().map(str::trim))
        .bind(req.category.map(|c| c.as_str()))
        .bind(req.country_code.as_ref().map(|c| c.to_uppercase()))
        .bind(&req.city)
        .bind(&req.address)
        .bind(&req.website)
        .bind(&req.email)
        .bind(&req.phone)
        .bind(domain)
        .bind(req.aum)
        .bind(req.pipeline_stage.map(|s| s.as_str()))
        .bind(&req.notes)
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| CrmError::from_db("Failed to update organisation", e))?
        .ok_or_else(|| CrmError::NotFound(format!("organisation {}", id)))
    }

    /// Soft delete organisation
    /// DOCUMENTATION: Sets is_active=false instead of physical deletion
    pub async fn soft_delete(pool: &PgPool, id: Uuid) -> Result<(), CrmError> {
        let rows = sqlx::query(
            "UPDATE organisations SET is_active = false, updated_at = NOW() WHERE id = $1 AND is_active = true",
        )
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| CrmError::from_db("Failed to delete organisation", e))?
        .rows_affected();

        if rows == 0 {
            return Err(CrmError::NotFound(format!("organisation {}", id)));
        }

        log::info!("Deleted organisation: {}", id);
        Ok(())
    }

    /// People linked to an organisation (active, primary contacts first)
    pub async fn members(pool: &PgPool, id: Uuid) -> Result<Vec<OrganisationMember>, CrmError> {
        sqlx::query_as::<_, OrganisationMember>(
            r#"
            SELECT p.id AS person_id, p.first_name, p.last_name, p.email,
                   COALESCE(po.job_title, p.job_title) AS job_title,
                   po.work_email, po.is_primary
            FROM person_organisations po
            JOIN people p ON p.id = po.person_id
            WHERE po.organisation_id = $1 AND p.is_active = true
            ORDER BY po.is_primary DESC, LOWER(p.last_name), LOWER(p.first_name)
            "#,
        )
        .bind(id)
        .fetch_all(pool)
        .await
        .map_err(|e| CrmError::from_db("Failed to fetch organisation members", e))
    }

    /// (mandates, interactions) counts shown on the detail page
    pub async fn activity_counts(pool: &PgPool, id: Uuid) -> Result<(i64, i64), CrmError> {
        sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM mandates WHERE organisation_id = $1),
                (SELECT COUNT(*) FROM interactions WHERE organisation_id = $1)
            "#,
        )
        .bind(id)
        .fetch_one(pool)
        .await
        .map_err(|e| CrmError::from_db("Failed to count organisation activity", e))
    }

    /// Possible duplicates for the autofill engine
    /// DOCUMENTATION: same domain, or a name containing the first significant token
    pub async fn find_candidates(
        pool: &PgPool,
        domain: Option<&str>,
        name_token: Option<&str>,
    ) -> Result<Vec<Organisation>, CrmError> {
        if domain.is_none() && name_token.is_none() {
            return Ok(Vec::new());
        }

        sqlx::query_as::<_, Organisation>(
            r#"
            SELECT * FROM organisations
            WHERE is_active = true
              AND (($1::text IS NOT NULL AND domain = $1)
                   OR ($2::text IS NOT NULL AND name ILIKE '%' || $2 || '%'))
            ORDER BY updated_at DESC
            LIMIT 25
            "#,
        )
        .bind(domain)
        .bind(name_token)
        .fetch_all(pool)
        .await
        .map_err(|e| CrmError::from_db("Organisation candidate lookup failed", e))
    }

    /// Active organisation counts grouped by category
    pub async fn count_by_category(pool: &PgPool) -> Result<Vec<(String, i64)>, CrmError> {
        sqlx::query_as::<_, (String, i64)>(
            "SELECT category, COUNT(*) FROM organisations WHERE is_active = true GROUP BY category ORDER BY COUNT(*) DESC",
        )
        .fetch_all(pool)
        .await
        .map_err(|e| CrmError::from_db("Failed to count organisations", e))
    }
}
