// src/services/interaction_service.rs
// DOCUMENTATION: Interactions, participants and follow-up actions

use crate::db::{InteractionRepository, OrganisationRepository};
use crate::errors::CrmError;
use crate::models::*;
use crate::services::EventPublisher;
use chrono::{Duration, Utc};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

/// Default follow-up horizon
pub const DEFAULT_FOLLOW_UP_DAYS: i64 = 7;
const MAX_FOLLOW_UP_DAYS: i64 = 365;

pub struct InteractionService;

impl InteractionService {
    pub async fn create(
        pool: &PgPool,
        publisher: &EventPublisher,
        actor: &str,
        req: CreateInteractionRequest,
    ) -> Result<Interaction, CrmError> {
        req.validate()?;
        if req.organisation_id.is_none() && req.participant_ids.is_empty() {
            return Err(CrmError::InvalidInput(
                "an interaction needs an organisation_id or at least one participant".to_string(),
            ));
        }
        if let Some(organisation_id) = req.organisation_id {
            OrganisationRepository::get_by_id(pool, organisation_id).await?;
        }
        Self::ensure_participants_exist(pool, &req.participant_ids).await?;

        let interaction = InteractionRepository::create(pool, &req, actor).await?;
        log::info!("Interaction {} ({}) logged by {}", interaction.id, interaction.kind, actor);

        if let Some(assignee) = interaction.assignee.as_deref() {
            Self::notify_assignee(publisher, actor, assignee, &interaction).await;
        }

        publisher.emit("interaction.created", &interaction);
        Ok(interaction)
    }

    pub async fn get(pool: &PgPool, id: Uuid) -> Result<Interaction, CrmError> {
        InteractionRepository::get_by_id(pool, id).await
    }

    pub async fn search(pool: &PgPool, query: InteractionQuery) -> Result<Paginated<Interaction>, CrmError> {
        if let (Some(from), Some(to)) = (query.from, query.to) {
            if to < from {
                return Err(CrmError::InvalidInput("'to' is before 'from'".to_string()));
            }
        }
        let (interactions, total) = InteractionRepository::search(pool, &query).await?;
        Ok(Paginated::new(interactions, total, query.page_params()))
    }

    pub async fn update(
        pool: &PgPool,
        publisher: &EventPublisher,
        actor: &str,
        id: Uuid,
        req: UpdateInteractionRequest,
    ) -> Result<Interaction, CrmError> {
        req.validate()?;
        if let Some(organisation_id) = req.organisation_id {
            OrganisationRepository::get_by_id(pool, organisation_id).await?;
        }
        if let Some(participants) = &req.participant_ids {
            Self::ensure_participants_exist(pool, participants).await?;
        }

        let previous = InteractionRepository::get_by_id(pool, id).await?;
        let interaction = InteractionRepository::update(pool, id, &req).await?;

        if let Some(assignee) = interaction.assignee.as_deref() {
            if previous.assignee.as_deref() != Some(assignee) {
                Self::notify_assignee(publisher, actor, assignee, &interaction).await;
            }
        }

        publisher.emit("interaction.updated", &interaction);
        Ok(interaction)
    }

    pub async fn delete(pool: &PgPool, publisher: &EventPublisher, actor: &str, id: Uuid) -> Result<(), CrmError> {
        InteractionRepository::delete(pool, id).await?;
        publisher.emit("interaction.deleted", &json!({ "id": id, "deleted_by": actor }));
        Ok(())
    }

    /// Open interactions due within the horizon
    pub async fn follow_ups(pool: &PgPool, query: FollowUpQuery) -> Result<Vec<Interaction>, CrmError> {
        let days = Self::follow_up_days(query.days)?;
        let until = Utc::now() + Duration::days(days);
        InteractionRepository::follow_ups(pool, until, query.assignee.as_deref()).await
    }

    fn follow_up_days(days: Option<i64>) -> Result<i64, CrmError> {
        match days.unwrap_or(DEFAULT_FOLLOW_UP_DAYS) {
            d if (0..=MAX_FOLLOW_UP_DAYS).contains(&d) => Ok(d),
            d => Err(CrmError::InvalidInput(format!(
                "days must be between 0 and {} (got {})",
                MAX_FOLLOW_UP_DAYS, d
            ))),
        }
    }

    async fn ensure_participants_exist(pool: &PgPool, ids: &[Uuid]) -> Result<(), CrmError> {
        let missing = InteractionRepository::missing_people(pool, ids).await?;
        if missing.is_empty() {
            return Ok(());
        }

        let listed: Vec<String> = missing.iter().map(Uuid::to_string).collect();
        Err(CrmError::InvalidInput(format!("unknown participants: {}", listed.join(", "))))
    }

    async fn notify_assignee(publisher: &EventPublisher, actor: &str, assignee: &str, interaction: &Interaction) {
        if !Self::should_notify(actor, assignee) {
            return;
        }

        publisher
            .notify_quietly(CreateNotificationRequest {
                recipient: assignee.to_string(),
                kind: NotificationKind::Assignment,
                title: format!("{} assigned you: {}", actor, interaction.title),
                message: interaction.next_action.clone(),
                link: Some(format!("/interactions/{}", interaction.id)),
                resource_type: Some("interaction".to_string()),
                resource_id: Some(interaction.id),
            })
            .await;
    }

    /// Self-assignment is silent
    fn should_notify(actor: &str, assignee: &str) -> bool {
        !assignee.trim().is_empty() && !assignee.eq_ignore_ascii_case(actor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_follow_up_days_bounds() {
        assert_eq!(InteractionService::follow_up_days(None).unwrap(), DEFAULT_FOLLOW_UP_DAYS);
        assert_eq!(InteractionService::follow_up_days(Some(0)).unwrap(), 0);
        assert_eq!(InteractionService::follow_up_days(Some(30)).unwrap(), 30);
        assert!(matches!(
            InteractionService::follow_up_days(Some(-1)),
            Err(CrmError::InvalidInput(_))
        ));
        assert!(InteractionService::follow_up_days(Some(MAX_FOLLOW_UP_DAYS + 1)).is_err());
    }

    #[test]
    fn test_self_assignment_is_silent() {
        assert!(!InteractionService::should_notify("alice", "alice"));
        assert!(!InteractionService::should_notify("alice", "ALICE"));
        assert!(!InteractionService::should_notify("alice", "  "));
        assert!(InteractionService::should_notify("alice", "bob"));
    }
}
