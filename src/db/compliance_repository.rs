// src/db/compliance_repository.rs
// DOCUMENTATION: Append-only RGPD audit trail

use crate::errors::CrmError;
use crate::models::*;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

pub struct ComplianceRepository;

impl ComplianceRepository {
    /// Append one entry; entries are never updated or deleted
    pub async fn insert<'e, E>(executor: E, entry: &NewComplianceLog) -> Result<ComplianceLog, CrmError>
    where
        E: sqlx::Executor<'e, Database = Postgres>,
    {
        let log_entry = sqlx::query_as::<_, ComplianceLog>(
            r#"
            INSERT INTO compliance_logs (actor, action, entity_type, entity_id, details, ip_address)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(&entry.actor)
        .bind(entry.action.as_str())
        .bind(&entry.entity_type)
        .bind(entry.entity_id)
        .bind(&entry.details)
        .bind(&entry.ip_address)
        .fetch_one(executor)
        .await
        .map_err(|e| CrmError::from_db("Failed to write compliance log", e))?;

        log::debug!(
            "Compliance log {} {} {:?} by {}",
            entry.action,
            entry.entity_type,
            entry.entity_id,
            entry.actor
        );
        Ok(log_entry)
    }

    pub async fn search(pool: &PgPool, query: &ComplianceQuery) -> Result<(Vec<ComplianceLog>, i64), CrmError> {
        let params = query.page_params();

        let mut count_qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM compliance_logs WHERE TRUE");
        Self::push_filters(&mut count_qb, query);
        let total: i64 = count_qb
            .build_query_scalar()
            .fetch_one(pool)
            .await
            .map_err(|e| CrmError::from_db("Compliance count query failed", e))?;

        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM compliance_logs WHERE TRUE");
        Self::push_filters(&mut qb, query);
        qb.push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(params.limit)
            .push(" OFFSET ")
            .push_bind(params.offset());

        let logs = qb
            .build_query_as::<ComplianceLog>()
            .fetch_all(pool)
            .await
            .map_err(|e| CrmError::from_db("Compliance search query failed", e))?;

        Ok((logs, total))
    }

    fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &ComplianceQuery) {
        if let Some(entity_type) = &query.entity_type {
            qb.push(" AND entity_type = ").push_bind(entity_type.clone());
        }
        if let Some(entity_id) = query.entity_id {
            qb.push(" AND entity_id = ").push_bind(entity_id);
        }
        if let Some(action) = query.action {
            qb.push(" AND action = ").push_bind(action.as_str());
        }
        if let Some(actor) = &query.actor {
            qb.push(" AND actor = ").push_bind(actor.clone());
        }
    }

    pub async fn for_person(pool: &PgPool, person_id: Uuid) -> Result<Vec<ComplianceLog>, CrmError> {
        sqlx::query_as::<_, ComplianceLog>(
            r#"
            SELECT * FROM compliance_logs
            WHERE entity_type = 'person' AND entity_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(person_id)
        .fetch_all(pool)
        .await
        .map_err(|e| CrmError::from_db("Failed to fetch person compliance history", e))
    }
}
