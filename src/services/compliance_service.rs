// src/services/compliance_service.rs
// DOCUMENTATION: RGPD data-subject rights and the audit trail
// PURPOSE: Access (export), erasure (anonymisation), consent, retention

use crate::db::{CampaignRepository, ComplianceRepository, InteractionRepository, PersonRepository};
use crate::errors::CrmError;
use crate::models::*;
use crate::services::EventPublisher;
use chrono::{Duration, Utc};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

pub struct ComplianceService;

impl ComplianceService {
    pub async fn list(pool: &PgPool, query: ComplianceQuery) -> Result<Paginated<ComplianceLog>, CrmError> {
        let (logs, total) = ComplianceRepository::search(pool, &query).await?;
        Ok(Paginated::new(logs, total, query.page_params()))
    }

    /// Everything held about a person; the export itself is audited
    pub async fn export_person(
        pool: &PgPool,
        actor: &str,
        ip: Option<String>,
        person_id: Uuid,
    ) -> Result<PersonExport, CrmError> {
        let person = PersonRepository::get_any(pool, person_id).await?;
        let organisations = PersonRepository::organisations_of(pool, person_id).await?;
        let interactions = InteractionRepository::for_person(pool, person_id).await?;
        let campaign_recipients = CampaignRepository::recipients_for_person(pool, person_id).await?;

        let entry = NewComplianceLog::person(actor, ComplianceAction::Export, person_id).with_ip(ip);
        ComplianceRepository::insert(pool, &entry).await?;
        let compliance_logs = ComplianceRepository::for_person(pool, person_id).await?;

        log::info!("Exported personal data of {} for {}", person_id, actor);
        Ok(PersonExport {
            exported_at: Utc::now(),
            person,
            organisations,
            interactions,
            campaign_recipients,
            compliance_logs,
        })
    }

    /// Right to erasure; a second request is refused with Conflict
    pub async fn anonymize_person(
        pool: &PgPool,
        publisher: &EventPublisher,
        actor: &str,
        ip: Option<String>,
        person_id: Uuid,
    ) -> Result<Person, CrmError> {
        let person = PersonRepository::get_any(pool, person_id).await?;
        if person.is_anonymized || !PersonRepository::anonymize(pool, person_id).await? {
            return Err(CrmError::Conflict(format!("person {} is already anonymised", person_id)));
        }

        let entry = NewComplianceLog::person(actor, ComplianceAction::Anonymize, person_id).with_ip(ip);
        ComplianceRepository::insert(pool, &entry).await?;

        publisher.emit("person.anonymized", &json!({ "id": person_id, "anonymized_by": actor }));
        PersonRepository::get_any(pool, person_id).await
    }

    /// Record an email opt-in/opt-out decision
    pub async fn set_consent(
        pool: &PgPool,
        actor: &str,
        ip: Option<String>,
        person_id: Uuid,
        email_opt_out: bool,
    ) -> Result<Person, CrmError> {
        let person = PersonRepository::get_any(pool, person_id).await?;
        if person.is_anonymized && !email_opt_out {
            return Err(CrmError::Conflict(format!(
                "person {} has been anonymised and cannot opt in",
                person_id
            )));
        }

        let person = PersonRepository::set_email_opt_out(pool, person_id, email_opt_out).await?;

        let action = if email_opt_out {
            ComplianceAction::ConsentWithdrawn
        } else {
            ComplianceAction::ConsentGiven
        };
        let entry = NewComplianceLog::person(actor, action, person_id)
            .with_details(json!({ "channel": "email" }))
            .with_ip(ip);
        ComplianceRepository::insert(pool, &entry).await?;

        log::info!("Consent for {} set to opt_out={} by {}", person_id, email_opt_out, actor);
        Ok(person)
    }

    /// Anonymise people idle for `days` (no update and no interaction)
    pub async fn retention_sweep(
        pool: &PgPool,
        publisher: &EventPublisher,
        actor: &str,
        days: i64,
    ) -> Result<RetentionReport, CrmError> {
        if days < 1 {
            return Err(CrmError::InvalidInput("days must be at least 1".to_string()));
        }

        let cutoff = Utc::now() - Duration::days(days);
        let candidates = PersonRepository::stale_people(pool, cutoff).await?;
        log::info!("Retention sweep: {} candidate(s) idle since {}", candidates.len(), cutoff);

        let mut person_ids = Vec::with_capacity(candidates.len());
        for id in candidates {
            if !PersonRepository::anonymize(pool, id).await? {
                continue;
            }

            let entry = NewComplianceLog::person(actor, ComplianceAction::Retention, id)
                .with_details(json!({ "days": days, "cutoff": cutoff }));
            ComplianceRepository::insert(pool, &entry).await?;
            publisher.emit("person.anonymized", &json!({ "id": id, "anonymized_by": actor, "retention_days": days }));
            person_ids.push(id);
        }

        if !person_ids.is_empty() {
            publisher
                .notify_quietly(CreateNotificationRequest {
                    recipient: BROADCAST_RECIPIENT.to_string(),
                    kind: NotificationKind::Compliance,
                    title: format!("Retention sweep anonymised {} people", person_ids.len()),
                    message: Some(format!("Inactive for more than {} days", days)),
                    link: None,
                    resource_type: None,
                    resource_id: None,
                })
                .await;
        }

        Ok(RetentionReport {
            days,
            cutoff,
            anonymized: person_ids.len(),
            person_ids,
        })
    }
}
