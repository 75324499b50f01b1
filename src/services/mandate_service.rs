// src/services/mandate_service.rs
// DOCUMENTATION: Mandate CRUD and the status lifecycle
// PURPOSE: proposed -> signed -> active -> terminated, with dates stamped on the way

use crate::db::{MandateRepository, OrganisationRepository};
use crate::errors::CrmError;
use crate::models::*;
use crate::services::EventPublisher;
use chrono::{NaiveDate, Utc};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

/// Dates written by a status change: (signed_at, starts_on)
type TransitionDates = (Option<NaiveDate>, Option<NaiveDate>);

pub struct MandateService;

impl MandateService {
    pub async fn create(
        pool: &PgPool,
        publisher: &EventPublisher,
        actor: &str,
        req: CreateMandateRequest,
    ) -> Result<Mandate, CrmError> {
        req.validate()?;
        validate_period(req.starts_on, req.ends_on)?;
        OrganisationRepository::get_by_id(pool, req.organisation_id).await?;

        let mandate = MandateRepository::create(pool, &req).await?;
        log::info!(
            "Mandate {} proposed to organisation {} by {}",
            mandate.id,
            mandate.organisation_id,
            actor
        );

        publisher.emit("mandate.created", &mandate);
        Ok(mandate)
    }

    pub async fn get(pool: &PgPool, id: Uuid) -> Result<Mandate, CrmError> {
        MandateRepository::get_by_id(pool, id).await
    }

    pub async fn search(pool: &PgPool, query: MandateQuery) -> Result<Paginated<Mandate>, CrmError> {
        let (mandates, total) = MandateRepository::search(pool, &query).await?;
        Ok(Paginated::new(mandates, total, query.page_params()))
    }

    /// Field update; the resulting period must stay ordered
    pub async fn update(
        pool: &PgPool,
        publisher: &EventPublisher,
        id: Uuid,
        req: UpdateMandateRequest,
    ) -> Result<Mandate, CrmError> {
        req.validate()?;
        let current = MandateRepository::get_by_id(pool, id).await?;
        if current.status == MandateStatus::Terminated {
            return Err(CrmError::Conflict(format!("mandate {} is terminated", id)));
        }
        validate_period(req.starts_on.or(current.starts_on), req.ends_on.or(current.ends_on))?;

        let mandate = MandateRepository::update(pool, id, &req).await?;
        publisher.emit("mandate.updated", &mandate);
        Ok(mandate)
    }

    pub async fn change_status(
        pool: &PgPool,
        publisher: &EventPublisher,
        actor: &str,
        id: Uuid,
        req: MandateStatusRequest,
    ) -> Result<Mandate, CrmError> {
        let current = MandateRepository::get_by_id(pool, id).await?;
        let effective_on = req.effective_on.unwrap_or_else(|| Utc::now().date_naive());
        let (signed_at, starts_on) = Self::transition_dates(&current, req.status, effective_on)?;

        let mandate =
            MandateRepository::set_status(pool, id, current.status, req.status, signed_at, starts_on).await?;
        log::info!("Mandate {}: {} -> {} by {}", id, current.status, mandate.status, actor);

        publisher.emit(
            "mandate.status_changed",
            &json!({
                "mandate": &mandate,
                "from": current.status,
                "to": mandate.status,
                "changed_by": actor,
            }),
        );

        publisher
            .notify_quietly(CreateNotificationRequest {
                recipient: BROADCAST_RECIPIENT.to_string(),
                kind: NotificationKind::Mandate,
                title: format!("Mandate \"{}\" is now {}", mandate.title, mandate.status),
                message: Some(format!("Changed from {} by {}", current.status, actor)),
                link: Some(format!("/mandates/{}", mandate.id)),
                resource_type: Some("mandate".to_string()),
                resource_id: Some(mandate.id),
            })
            .await;

        Ok(mandate)
    }

    /// Check the move and compute the dates it stamps
    /// DOCUMENTATION: existing dates are kept; signing/activating fill them when absent
    fn transition_dates(
        current: &Mandate,
        next: MandateStatus,
        effective_on: NaiveDate,
    ) -> Result<TransitionDates, CrmError> {
        if !current.status.can_transition_to(next) {
            return Err(CrmError::InvalidTransition {
                from: current.status.to_string(),
                to: next.to_string(),
            });
        }

        match next {
            MandateStatus::Signed => Ok((Some(current.signed_at.unwrap_or(effective_on)), None)),
            MandateStatus::Active => {
                let starts_on = current.starts_on.unwrap_or(effective_on);
                validate_period(Some(starts_on), current.ends_on)?;
                Ok((None, Some(starts_on)))
            }
            _ => Ok((None, None)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mandate(status: MandateStatus) -> Mandate {
        Mandate {
            id: Uuid::new_v4(),
            organisation_id: Uuid::new_v4(),
            title: "Luxembourg distribution".to_string(),
            status,
            signed_at: None,
            starts_on: None,
            ends_on: None,
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn test_signing_stamps_signed_at() {
        let dates = MandateService::transition_dates(&mandate(MandateStatus::Proposed), MandateStatus::Signed, day(5));
        assert_eq!(dates.unwrap(), (Some(day(5)), None));

        let mut already = mandate(MandateStatus::Proposed);
        already.signed_at = Some(day(1));
        let dates = MandateService::transition_dates(&already, MandateStatus::Signed, day(5));
        assert_eq!(dates.unwrap(), (Some(day(1)), None));
    }

    #[test]
    fn test_activation_defaults_start_and_checks_period() {
        let dates = MandateService::transition_dates(&mandate(MandateStatus::Signed), MandateStatus::Active, day(10));
        assert_eq!(dates.unwrap(), (None, Some(day(10))));

        let mut ends_early = mandate(MandateStatus::Signed);
        ends_early.ends_on = Some(day(2));
        assert!(matches!(
            MandateService::transition_dates(&ends_early, MandateStatus::Active, day(10)),
            Err(CrmError::ValidationError(_))
        ));
    }

    #[test]
    fn test_invalid_transition_is_rejected() {
        let err = MandateService::transition_dates(&mandate(MandateStatus::Proposed), MandateStatus::Active, day(1))
            .unwrap_err();
        match err {
            CrmError::InvalidTransition { from, to } => {
                assert_eq!(from, "proposed");
                assert_eq!(to, "active");
            }
            other => panic!("unexpected error: {:?}", other),
        }

        assert!(MandateService::transition_dates(
            &mandate(MandateStatus::Terminated),
            MandateStatus::Active,
            day(1)
        )
        .is_err());
    }
}
