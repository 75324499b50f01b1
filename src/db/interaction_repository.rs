// src/db/interaction_repository.rs
// DOCUMENTATION: Database access layer for interactions and participants

use crate::errors::CrmError;
use crate::models::*;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

/// Interaction columns plus aggregated participants; callers append WHERE and GROUP BY
const SELECT_INTERACTION: &str = r#"
    SELECT i.*,
           COALESCE(ARRAY_AGG(ip.person_id) FILTER (WHERE ip.person_id IS NOT NULL), '{}'::uuid[]) AS participant_ids
    FROM interactions i
    LEFT JOIN interaction_participants ip ON ip.interaction_id = i.id
"#;

pub struct InteractionRepository;

impl InteractionRepository {
    pub async fn create(
        pool: &PgPool,
        req: &CreateInteractionRequest,
        created_by: &str,
    ) -> Result<Interaction, CrmError> {
        let mut tx = pool
            .begin()
            .await
            .map_err(|e| CrmError::from_db("Failed to open transaction", e))?;

        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO interactions (
                organisation_id, kind, title, body, occurred_at, status,
                created_by, assignee, next_action, next_action_at
            )
            VALUES ($1, $2, $3, $4, COALESCE($5, NOW()), $6, $7, $8, $9, $10)
            RETURNING id
            "#,
        )
        .bind(req.organisation_id)
        .bind(req.kind.as_str())
        .bind(req.title.trim())
        .bind(&req.body)
        .bind(req.occurred_at)
        .bind(req.effective_status().as_str())
        .bind(created_by)
        .bind(&req.assignee)
        .bind(&req.next_action)
        .bind(req.next_action_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| CrmError::from_db("Failed to create interaction", e))?;

        Self::replace_participants(&mut tx, id, &req.participant_ids).await?;

        tx.commit()
            .await
            .map_err(|e| CrmError::from_db("Failed to commit interaction", e))?;

        log::info!("Created interaction {} by {}", id, created_by);
        Self::get_by_id(pool, id).await
    }

    async fn replace_participants(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        interaction_id: Uuid,
        person_ids: &[Uuid],
    ) -> Result<(), CrmError> {
        sqlx::query("DELETE FROM interaction_participants WHERE interaction_id = $1")
            .bind(interaction_id)
            .execute(&mut **tx)
            .await
            .map_err(|e| CrmError::from_db("Failed to clear participants", e))?;

        if person_ids.is_empty() {
            return Ok(());
        }

        sqlx::query(
            r#"
            INSERT INTO interaction_participants (interaction_id, person_id)
            SELECT $1, UNNEST($2::uuid[])
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(interaction_id)
        .bind(person_ids)
        .execute(&mut **tx)
        .await
        .map_err(|e| CrmError::from_db("Failed to add participants", e))?;

        Ok(())
    }

    pub async fn get_by_id(pool: &PgPool, id: Uuid) -> Result<Interaction, CrmError> {
        let sql = format!("{} WHERE i.id = $1 GROUP BY i.id", SELECT_INTERACTION);
        sqlx::query_as::<_, Interaction>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(|e| CrmError::from_db("Failed to fetch interaction", e))?
            .ok_or_else(|| CrmError::NotFound(format!("interaction {}", id)))
    }

    /// Filtered list, newest first
    pub async fn search(
        pool: &PgPool,
        query: &InteractionQuery,
    ) -> Result<(Vec<Interaction>, i64), CrmError> {
        let params = query.page_params();

        let mut count_qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM interactions i");
        Self::push_filters(&mut count_qb, query);
        let total: i64 = count_qb
            .build_query_scalar()
            .fetch_one(pool)
            .await
            .map_err(|e| CrmError::from_db("Interaction count query failed", e))?;

        let mut qb = QueryBuilder::<Postgres>::new(SELECT_INTERACTION);
        Self::push_filters(&mut qb, query);
        qb.push(" GROUP BY i.id ORDER BY i.occurred_at DESC LIMIT ")
            .push_bind(params.limit)
            .push(" OFFSET ")
            .push_bind(params.offset());

        let interactions = qb
            .build_query_as::<Interaction>()
            .fetch_all(pool)
            .await
            .map_err(|e| CrmError::from_db("Interaction search query failed", e))?;

        Ok((interactions, total))
    }

    fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &InteractionQuery) {
        qb.push(" WHERE TRUE");

        if let Some(org_id) = query.organisation_id {
            qb.push(" AND i.organisation_id = ").push_bind(org_id);
        }
        if let Some(person_id) = query.person_id {
            qb.push(" AND EXISTS (SELECT 1 FROM interaction_participants p WHERE p.interaction_id = i.id AND p.person_id = ")
                .push_bind(person_id)
                .push(")");
        }
        if let Some(kind) = query.kind {
            qb.push(" AND i.kind = ").push_bind(kind.as_str());
        }
        if let Some(status) = query.status {
            qb.push(" AND i.status = ").push_bind(status.as_str());
        }
        if let Some(assignee) = &query.assignee {
            qb.push(" AND i.assignee = ").push_bind(assignee.clone());
        }
        if let Some(from) = query.from {
            qb.push(" AND i.occurred_at >= ").push_bind(from);
        }
        if let Some(to) = query.to {
            qb.push(" AND i.occurred_at <= ").push_bind(to);
        }
    }

    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        req: &UpdateInteractionRequest,
    ) -> Result<Interaction, CrmError> {
        let mut tx = pool
            .begin()
            .await
            .map_err(|e| CrmError::from_db("Failed to open transaction", e))?;

        let rows = sqlx::query(
            r#"
            UPDATE interactions
            SET organisation_id = COALESCE($1, organisation_id),
                kind = COALESCE($2, kind),
                title = COALESCE($3, title),
                body = COALESCE($4, body),
                occurred_at = COALESCE($5, occurred_at),
                status = COALESCE($6, status),
                assignee = COALESCE($7, assignee),
                next_action = COALESCE($8, next_action),
                next_action_at = COALESCE($9, next_action_at),
                updated_at = NOW()
            WHERE id = $10
            "#,
        )
        .bind(req.organisation_id)
        .bind(req.kind.map(|k| k.as_str()))
        .bind(req.title.as_deref().map(str::trim))
        .bind(&req.body)
        .bind(req.occurred_at)
        .bind(req.status.map(|s| s.as_str()))
        .bind(&req.assignee)
        .bind(&req.next_action)
        .bind(req.next_action_at)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| CrmError::from_db("Failed to update interaction", e))?
        .rows_affected();

        if rows == 0 {
            return Err(CrmError::NotFound(format!("interaction {}", id)));
        }

        if let Some(participants) = &req.participant_ids {
            Self::replace_participants(&mut tx, id, participants).await?;
        }

        tx.commit()
            .await
            .map_err(|e| CrmError::from_db("Failed to commit interaction update", e))?;

        log::info!("Updated interaction {}", id);
        Self::get_by_id(pool, id).await
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<(), CrmError> {
        let rows = sqlx::query("DELETE FROM interactions WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await
            .map_err(|e| CrmError::from_db("Failed to delete interaction", e))?
            .rows_affected();

        if rows == 0 {
            return Err(CrmError::NotFound(format!("interaction {}", id)));
        }
        log::info!("Deleted interaction {}", id);
        Ok(())
    }

    /// Open interactions whose next action is due before `until`
    pub async fn follow_ups(
        pool: &PgPool,
        until: DateTime<Utc>,
        assignee: Option<&str>,
    ) -> Result<Vec<Interaction>, CrmError> {
        let sql = format!(
            r#"{}
            WHERE i.status <> 'done'
              AND i.next_action_at IS NOT NULL
              AND i.next_action_at <= $1
              AND ($2::text IS NULL OR i.assignee = $2)
            GROUP BY i.id
            ORDER BY i.next_action_at ASC
            LIMIT 200"#,
            SELECT_INTERACTION
        );

        sqlx::query_as::<_, Interaction>(&sql)
            .bind(until)
            .bind(assignee)
            .fetch_all(pool)
            .await
            .map_err(|e| CrmError::from_db("Follow-up query failed", e))
    }

    /// Every interaction a person took part in (RGPD export)
    pub async fn for_person(pool: &PgPool, person_id: Uuid) -> Result<Vec<Interaction>, CrmError> {
        let sql = format!(
            r#"{}
            WHERE EXISTS (SELECT 1 FROM interaction_participants p WHERE p.interaction_id = i.id AND p.person_id = $1)
            GROUP BY i.id
            ORDER BY i.occurred_at DESC"#,
            SELECT_INTERACTION
        );

        sqlx::query_as::<_, Interaction>(&sql)
            .bind(person_id)
            .fetch_all(pool)
            .await
            .map_err(|e| CrmError::from_db("Failed to fetch person interactions", e))
    }

    /// Subset of `ids` that are not active people
    pub async fn missing_people(pool: &PgPool, ids: &[Uuid]) -> Result<Vec<Uuid>, CrmError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let found: Vec<Uuid> =
            sqlx::query_scalar("SELECT id FROM people WHERE id = ANY($1) AND is_active = true")
                .bind(ids)
                .fetch_all(pool)
                .await
                .map_err(|e| CrmError::from_db("Failed to check participants", e))?;

        Ok(ids.iter().filter(|id| !found.contains(id)).copied().collect())
    }

    /// (interactions in the last 30 days, open follow-ups)
    pub async fn activity_counts(pool: &PgPool) -> Result<(i64, i64), CrmError> {
        sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM interactions WHERE occurred_at >= NOW() - INTERVAL '30 days'),
                (SELECT COUNT(*) FROM interactions WHERE status <> 'done' AND next_action_at IS NOT NULL)
            "#,
        )
        .fetch_one(pool)
        .await
        .map_err(|e| CrmError::from_db("Failed to count interactions", e))
    }
}
