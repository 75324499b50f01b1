// src/db/mandate_repository.rs
// DOCUMENTATION: Database access layer for mandates

use crate::errors::CrmError;
use crate::models::*;
use chrono::NaiveDate;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

pub struct MandateRepository;

impl MandateRepository {
    pub async fn create(pool: &PgPool, req: &CreateMandateRequest) -> Result<Mandate, CrmError> {
        let mandate = sqlx::query_as::<_, Mandate>(
            r#"
            INSERT INTO mandates (organisation_id, title, status, starts_on, ends_on, notes)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(req.organisation_id)
        .bind(req.title.trim())
        .bind(MandateStatus::Proposed.as_str())
        .bind(req.starts_on)
        .bind(req.ends_on)
        .bind(&req.notes)
        .fetch_one(pool)
        .await
        .map_err(|e| CrmError::from_db("Failed to create mandate", e))?;

        log::info!("Created mandate {} for organisation {}", mandate.id, mandate.organisation_id);
        Ok(mandate)
    }

    pub async fn get_by_id(pool: &PgPool, id: Uuid) -> Result<Mandate, CrmError> {
        sqlx::query_as::<_, Mandate>("SELECT * FROM mandates WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(|e| CrmError::from_db("Failed to fetch mandate", e))?
            .ok_or_else(|| CrmError::NotFound(format!("mandate {}", id)))
    }

    pub async fn search(pool: &PgPool, query: &MandateQuery) -> Result<(Vec<Mandate>, i64), CrmError> {
        let params = query.page_params();

        let mut count_qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM mandates");
        Self::push_filters(&mut count_qb, query);
        let total: i64 = count_qb
            .build_query_scalar()
            .fetch_one(pool)
            .await
            .map_err(|e| CrmError::from_db("Mandate count query failed", e))?;

        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM mandates");
        Self::push_filters(&mut qb, query);
        qb.push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(params.limit)
            .push(" OFFSET ")
            .push_bind(params.offset());

        let mandates = qb
            .build_query_as::<Mandate>()
            .fetch_all(pool)
            .await
            .map_err(|e| CrmError::from_db("Mandate search query failed", e))?;

        Ok((mandates, total))
    }

    fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &MandateQuery) {
        qb.push(" WHERE TRUE");
        if let Some(org_id) = query.organisation_id {
            qb.push(" AND organisation_id = ").push_bind(org_id);
        }
        if let Some(status) = query.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
    }

    pub async fn update(pool: &PgPool, id: Uuid, req: &UpdateMandateRequest) -> Result<Mandate, CrmError> {
        sqlx::query_as::<_, Mandate>(
            r#"
            UPDATE mandates
            SET title = COALESCE($1, title),
                starts_on = COALESCE($2, starts_on),
                ends_on = COALESCE($3, ends_on),
                notes = COALESCE($4, notes),
                updated_at = NOW()
            WHERE id = $5
            RETURNING *
            "#,
        )
        .bind(req.title.as_deref().map(str::trim))
        .bind(req.starts_on)
        .bind(req.ends_on)
        .bind(&req.notes)
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| CrmError::from_db("Failed to update mandate", e))?
        .ok_or_else(|| CrmError::NotFound(format!("mandate {}", id)))
    }

    /// Persist a status move guarded by the expected current status
    /// DOCUMENTATION: Conflict when another request moved it first
    pub async fn set_status(
        pool: &PgPool,
        id: Uuid,
        expected: MandateStatus,
        next: MandateStatus,
        signed_at: Option<NaiveDate>,
        starts_on: Option<NaiveDate>,
    ) -> Result<Mandate, CrmError> {
        sqlx::query_as::<_, Mandate>(
            r#"
            UPDATE mandates
            SET status = $1,
                signed_at = COALESCE(signed_at, $2),
                starts_on = COALESCE(starts_on, $3),
                updated_at = NOW()
            WHERE id = $4 AND status = $5
            RETURNING *
            "#,
        )
        .bind(next.as_str())
        .bind(signed_at)
        .bind(starts_on)
        .bind(id)
        .bind(expected.as_str())
        .fetch_optional(pool)
        .await
        .map_err(|e| CrmError::from_db("Failed to change mandate status", e))?
        .ok_or_else(|| CrmError::Conflict(format!("mandate {} changed concurrently", id)))
    }

    pub async fn count_by_status(pool: &PgPool) -> Result<Vec<(String, i64)>, CrmError> {
        sqlx::query_as::<_, (String, i64)>(
            "SELECT status, COUNT(*) FROM mandates GROUP BY status ORDER BY status",
        )
        .fetch_all(pool)
        .await
        .map_err(|e| CrmError::from_db("Failed to count mandates", e))
    }
}
