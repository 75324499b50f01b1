// src/db/campaign_repository.rs
// DOCUMENTATION: Database access layer for campaigns and recipients

use crate::errors::CrmError;
use crate::models::*;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

pub struct CampaignRepository;

impl CampaignRepository {
    pub async fn create(
        pool: &PgPool,
        req: &CreateCampaignRequest,
        created_by: &str,
    ) -> Result<Campaign, CrmError> {
        let campaign = sqlx::query_as::<_, Campaign>(
            r#"
            INSERT INTO campaigns (name, subject, body_template, from_email, status, created_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(req.name.trim())
        .bind(req.subject.trim())
        .bind(&req.body_template)
        .bind(&req.from_email)
        .bind(CampaignStatus::Draft.as_str())
        .bind(created_by)
        .fetch_one(pool)
        .await
        .map_err(|e| CrmError::from_db("Failed to create campaign", e))?;

        log::info!("Created campaign '{}' ({})", campaign.name, campaign.id);
        Ok(campaign)
    }

    pub async fn get_by_id(pool: &PgPool, id: Uuid) -> Result<Campaign, CrmError> {
        sqlx::query_as::<_, Campaign>("SELECT * FROM campaigns WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(|e| CrmError::from_db("Failed to fetch campaign", e))?
            .ok_or_else(|| CrmError::NotFound(format!("campaign {}", id)))
    }

    pub async fn search(pool: &PgPool, query: &CampaignQuery) -> Result<(Vec<Campaign>, i64), CrmError> {
        let params = query.page_params();

        let mut count_qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM campaigns WHERE TRUE");
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM campaigns WHERE TRUE");
        if let Some(status) = query.status {
            count_qb.push(" AND status = ").push_bind(status.as_str());
            qb.push(" AND status = ").push_bind(status.as_str());
        }

        let total: i64 = count_qb
            .build_query_scalar()
            .fetch_one(pool)
            .await
            .map_err(|e| CrmError::from_db("Campaign count query failed", e))?;

        qb.push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(params.limit)
            .push(" OFFSET ")
            .push_bind(params.offset());

        let campaigns = qb
            .build_query_as::<Campaign>()
            .fetch_all(pool)
            .await
            .map_err(|e| CrmError::from_db("Campaign search query failed", e))?;

        Ok((campaigns, total))
    }

    /// Partial update, only while the campaign is still editable
    pub async fn update(pool: &PgPool, id: Uuid, req: &UpdateCampaignRequest) -> Result<Option<Campaign>, CrmError> {
        sqlx::query_as::<_, Campaign>(
            r#"
            UPDATE campaigns
            SET name = COALESCE($1, name),
                subject = COALESCE($2, subject),
                body_template = COALESCE($3, body_template),
                from_email = COALESCE($4, from_email),
                updated_at = NOW()
            WHERE id = $5 AND status IN ('draft', 'scheduled')
            RETURNING *
            "#,
        )
        .bind(req.name.as_deref().map(str::trim))
        .bind(req.subject.as_deref().map(str::trim))
        .bind(&req.body_template)
        .bind(&req.from_email)
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| CrmError::from_db("Failed to update campaign", e))
    }

    /// Hard delete; only drafts and cancelled campaigns
    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<u64, CrmError> {
        sqlx::query("DELETE FROM campaigns WHERE id = $1 AND status IN ('draft', 'cancelled')")
            .bind(id)
            .execute(pool)
            .await
            .map(|r| r.rows_affected())
            .map_err(|e| CrmError::from_db("Failed to delete campaign", e))
    }

    /// Move to `next` only if the current status is one of `expected`
    pub async fn transition(
        pool: &PgPool,
        id: Uuid,
        expected: &[CampaignStatus],
        next: CampaignStatus,
        scheduled_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Campaign>, CrmError> {
        let expected: Vec<&str> = expected.iter().map(|s| s.as_str()).collect();

        sqlx::query_as::<_, Campaign>(
            r#"
            UPDATE campaigns
            SET status = $1,
                scheduled_at = CASE WHEN $1 = 'scheduled' THEN $2 ELSE scheduled_at END,
                sent_at = CASE WHEN $1 IN ('sent', 'failed') THEN NOW() ELSE sent_at END,
                updated_at = NOW()
            WHERE id = $3 AND status = ANY($4)
            RETURNING *
            "#,
        )
        .bind(next.as_str())
        .bind(scheduled_at)
        .bind(id)
        .bind(&expected)
        .fetch_optional(pool)
        .await
        .map_err(|e| CrmError::from_db("Failed to change campaign status", e))
    }

    /// People matched by the recipient selectors, one row per person
    /// DOCUMENTATION: organisation_name comes from the primary link when present
    pub async fn recipient_candidates(
        pool: &PgPool,
        req: &AddRecipientsRequest,
    ) -> Result<Vec<RecipientCandidate>, CrmError> {
        sqlx::query_as::<_, RecipientCandidate>(
            r#"
            SELECT DISTINCT ON (p.id)
                   p.id AS person_id, p.first_name, p.last_name, p.email,
                   o.name AS organisation_name,
                   p.email_opt_out, p.is_anonymized, p.is_active
            FROM people p
            LEFT JOIN person_organisations po ON po.person_id = p.id
            LEFT JOIN organisations o ON o.id = po.organisation_id AND o.is_active = true
            WHERE p.id = ANY($1)
               OR po.organisation_id = ANY($2)
               OR ($3::text IS NOT NULL AND o.category = $3)
            ORDER BY p.id, po.is_primary DESC NULLS LAST
            "#,
        )
        .bind(&req.person_ids)
        .bind(&req.organisation_ids)
        .bind(req.category.map(|c| c.as_str()))
        .fetch_all(pool)
        .await
        .map_err(|e| CrmError::from_db("Recipient selection failed", e))
    }

    pub async fn existing_emails(pool: &PgPool, campaign_id: Uuid) -> Result<Vec<String>, CrmError> {
        sqlx::query_scalar::<_, String>(
            "SELECT LOWER(email) FROM campaign_recipients WHERE campaign_id = $1",
        )
        .bind(campaign_id)
        .fetch_all(pool)
        .await
        .map_err(|e| CrmError::from_db("Failed to fetch campaign recipients", e))
    }

    /// Bulk insert (person_id, email) pairs; conflicts on email are ignored
    pub async fn insert_recipients(
        pool: &PgPool,
        campaign_id: Uuid,
        rows: &[(Uuid, String)],
    ) -> Result<u64, CrmError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let person_ids: Vec<Uuid> = rows.iter().map(|(id, _)| *id).collect();
        let emails: Vec<String> = rows.iter().map(|(_, email)| email.clone()).collect();

        let result = sqlx::query(
            r#"
            INSERT INTO campaign_recipients (campaign_id, person_id, email)
            SELECT $1, t.person_id, t.email
            FROM UNNEST($2::uuid[], $3::text[]) AS t(person_id, email)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(campaign_id)
        .bind(&person_ids)
        .bind(&emails)
        .execute(pool)
        .await
        .map_err(|e| CrmError::from_db("Failed to insert campaign recipients", e))?;

        Ok(result.rows_affected())
    }

    pub async fn recipients(
        pool: &PgPool,
        campaign_id: Uuid,
        query: &RecipientQuery,
    ) -> Result<(Vec<CampaignRecipient>, i64), CrmError> {
        let params = query.page_params();
        let status = query.status.map(|s| s.as_str());

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM campaign_recipients WHERE campaign_id = $1 AND ($2::text IS NULL OR status = $2)",
        )
        .bind(campaign_id)
        .bind(status)
        .fetch_one(pool)
        .await
        .map_err(|e| CrmError::from_db("Recipient count query failed", e))?;

        let recipients = sqlx::query_as::<_, CampaignRecipient>(
            r#"
            SELECT * FROM campaign_recipients
            WHERE campaign_id = $1 AND ($2::text IS NULL OR status = $2)
            ORDER BY created_at, email
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(campaign_id)
        .bind(status)
        .bind(params.limit)
        .bind(params.offset())
        .fetch_all(pool)
        .await
        .map_err(|e| CrmError::from_db("Recipient list query failed", e))?;

        Ok((recipients, total))
    }

    /// Pending recipients with the fields the template needs
    pub async fn pending_messages(pool: &PgPool, campaign_id: Uuid) -> Result<Vec<OutboundMessage>, CrmError> {
        sqlx::query_as::<_, OutboundMessage>(
            r#"
            SELECT r.id AS recipient_id, r.email, p.first_name, p.last_name,
                   org.name AS organisation_name,
                   COALESCE(p.email_opt_out OR p.is_anonymized OR NOT p.is_active, false) AS blocked
            FROM campaign_recipients r
            LEFT JOIN people p ON p.id = r.person_id
            LEFT JOIN LATERAL (
                SELECT o.name
                FROM person_organisations po
                JOIN organisations o ON o.id = po.organisation_id
                WHERE po.person_id = r.person_id
                ORDER BY po.is_primary DESC
                LIMIT 1
            ) org ON true
            WHERE r.campaign_id = $1 AND r.status = 'pending'
            ORDER BY r.created_at
            "#,
        )
        .bind(campaign_id)
        .fetch_all(pool)
        .await
        .map_err(|e| CrmError::from_db("Failed to load pending recipients", e))
    }

    pub async fn mark_recipient(
        pool: &PgPool,
        recipient_id: Uuid,
        status: RecipientStatus,
        error: Option<&str>,
    ) -> Result<(), CrmError> {
        sqlx::query(
            r#"
            UPDATE campaign_recipients
            SET status = $1,
                error = $2,
                sent_at = CASE WHEN $1 = 'sent' THEN NOW() ELSE sent_at END
            WHERE id = $3
            "#,
        )
        .bind(status.as_str())
        .bind(error)
        .bind(recipient_id)
        .execute(pool)
        .await
        .map_err(|e| CrmError::from_db("Failed to update recipient status", e))?;
        Ok(())
    }

    pub async fn counters(pool: &PgPool, campaign_id: Uuid) -> Result<RecipientCounters, CrmError> {
        sqlx::query_as::<_, RecipientCounters>(
            r#"
            SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE status = 'pending') AS pending,
                COUNT(*) FILTER (WHERE status = 'sent') AS sent,
                COUNT(*) FILTER (WHERE status = 'failed') AS failed,
                COUNT(*) FILTER (WHERE status = 'skipped') AS skipped,
                COUNT(opened_at) AS opened,
                COUNT(clicked_at) AS clicked,
                COUNT(unsubscribed_at) AS unsubscribed
            FROM campaign_recipients
            WHERE campaign_id = $1
            "#,
        )
        .bind(campaign_id)
        .fetch_one(pool)
        .await
        .map_err(|e| CrmError::from_db("Failed to compute campaign counters", e))
    }

    pub async fn get_recipient(pool: &PgPool, recipient_id: Uuid) -> Result<CampaignRecipient, CrmError> {
        sqlx::query_as::<_, CampaignRecipient>("SELECT * FROM campaign_recipients WHERE id = $1")
            .bind(recipient_id)
            .fetch_optional(pool)
            .await
            .map_err(|e| CrmError::from_db("Failed to fetch recipient", e))?
            .ok_or_else(|| CrmError::NotFound(format!("recipient {}", recipient_id)))
    }

    /// Record first open; true when this call recorded it
    pub async fn record_open(pool: &PgPool, recipient_id: Uuid) -> Result<bool, CrmError> {
        sqlx::query("UPDATE campaign_recipients SET opened_at = NOW() WHERE id = $1 AND opened_at IS NULL")
            .bind(recipient_id)
            .execute(pool)
            .await
            .map(|r| r.rows_affected() > 0)
            .map_err(|e| CrmError::from_db("Failed to record open", e))
    }

    /// Record first click; a click also implies an open
    pub async fn record_click(pool: &PgPool, recipient_id: Uuid) -> Result<bool, CrmError> {
        sqlx::query(
            r#"
            UPDATE campaign_recipients
            SET clicked_at = COALESCE(clicked_at, NOW()),
                opened_at = COALESCE(opened_at, NOW())
            WHERE id = $1 AND clicked_at IS NULL
            "#,
        )
        .bind(recipient_id)
        .execute(pool)
        .await
        .map(|r| r.rows_affected() > 0)
        .map_err(|e| CrmError::from_db("Failed to record click", e))
    }

    pub async fn record_unsubscribe(pool: &PgPool, recipient_id: Uuid) -> Result<bool, CrmError> {
        sqlx::query("UPDATE campaign_recipients SET unsubscribed_at = NOW() WHERE id = $1 AND unsubscribed_at IS NULL")
            .bind(recipient_id)
            .execute(pool)
            .await
            .map(|r| r.rows_affected() > 0)
            .map_err(|e| CrmError::from_db("Failed to record unsubscribe", e))
    }

    /// Campaigns left in `sending`, oldest first; after a restart no task owns them
    pub async fn interrupted_runs(pool: &PgPool) -> Result<Vec<Uuid>, CrmError> {
        sqlx::query_scalar::<_, Uuid>("SELECT id FROM campaigns WHERE status = $1 ORDER BY updated_at")
            .bind(CampaignStatus::Sending.as_str())
            .fetch_all(pool)
            .await
            .map_err(|e| CrmError::from_db("Failed to fetch interrupted campaigns", e))
    }

    /// Scheduled campaigns whose time has come
    pub async fn due_scheduled(pool: &PgPool, now: DateTime<Utc>) -> Result<Vec<Uuid>, CrmError> {
        sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM campaigns WHERE status = 'scheduled' AND scheduled_at <= $1 ORDER BY scheduled_at",
        )
        .bind(now)
        .fetch_all(pool)
        .await
        .map_err(|e| CrmError::from_db("Failed to fetch due campaigns", e))
    }

    pub async fn recipients_for_person(pool: &PgPool, person_id: Uuid) -> Result<Vec<CampaignRecipient>, CrmError> {
        sqlx::query_as::<_, CampaignRecipient>(
            "SELECT * FROM campaign_recipients WHERE person_id = $1 ORDER BY created_at DESC",
        )
        .bind(person_id)
        .fetch_all(pool)
        .await
        .map_err(|e| CrmError::from_db("Failed to fetch person campaign history", e))
    }

    pub async fn count_by_status(pool: &PgPool) -> Result<Vec<(String, i64)>, CrmError> {
        sqlx::query_as::<_, (String, i64)>(
            "SELECT status, COUNT(*) FROM campaigns GROUP BY status ORDER BY status",
        )
        .fetch_all(pool)
        .await
        .map_err(|e| CrmError::from_db("Failed to count campaigns", e))
    }
}
