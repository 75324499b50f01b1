// src/models/mandate.rs
// DOCUMENTATION: Mandates signed with organisations and their lifecycle

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use super::PageParams;

string_enum!(
    MandateStatus {
        Proposed => "proposed",
        Signed => "signed",
        Active => "active",
        Terminated => "terminated",
    }
);

impl MandateStatus {
    /// Allowed lifecycle moves; `terminated` is final
    pub fn can_transition_to(&self, next: MandateStatus) -> bool {
        use MandateStatus::*;
        matches!(
            (self, next),
            (Proposed, Signed) | (Proposed, Terminated) | (Signed, Active) | (Signed, Terminated) | (Active, Terminated)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Mandate {
    pub id: Uuid,
    pub organisation_id: Uuid,
    pub title: String,
    #[sqlx(try_from = "String")]
    pub status: MandateStatus,
    pub signed_at: Option<NaiveDate>,
    pub starts_on: Option<NaiveDate>,
    pub ends_on: Option<NaiveDate>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateMandateRequest {
    pub organisation_id: Uuid,

    #[validate(length(min = 1, max = 255))]
    pub title: String,

    #[serde(default)]
    pub starts_on: Option<NaiveDate>,

    #[serde(default)]
    pub ends_on: Option<NaiveDate>,

    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize, Validate)]
pub struct UpdateMandateRequest {
    #[validate(length(min = 1, max = 255))]
    pub title: Option<String>,
    pub starts_on: Option<NaiveDate>,
    pub ends_on: Option<NaiveDate>,
    pub notes: Option<String>,
}

/// Body for POST /mandates/{id}/status
#[derive(Debug, Deserialize)]
pub struct MandateStatusRequest {
    pub status: MandateStatus,
    /// Date recorded for signature or start; defaults to today
    #[serde(default)]
    pub effective_on: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MandateQuery {
    pub organisation_id: Option<Uuid>,
    pub status: Option<MandateStatus>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl MandateQuery {
    pub fn page_params(&self) -> PageParams {
        PageParams::new(self.page, self.limit)
    }
}

/// Check that the mandate period is not inverted
pub fn validate_period(
    starts_on: Option<NaiveDate>,
    ends_on: Option<NaiveDate>,
) -> Result<(), crate::errors::CrmError> {
    match (starts_on, ends_on) {
        (Some(start), Some(end)) if end < start => Err(crate::errors::CrmError::ValidationError(
            format!("ends_on ({}) is before starts_on ({})", end, start),
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_transitions() {
        use MandateStatus::*;
        assert!(Proposed.can_transition_to(Signed));
        assert!(Proposed.can_transition_to(Terminated));
        assert!(!Proposed.can_transition_to(Active));
        assert!(Signed.can_transition_to(Active));
        assert!(Active.can_transition_to(Terminated));
        assert!(!Active.can_transition_to(Signed));
        for next in MandateStatus::ALL {
            assert!(!Terminated.can_transition_to(*next));
        }
    }

    #[test]
    fn test_status_round_trips_through_text() {
        assert_eq!("active".parse::<MandateStatus>().unwrap(), MandateStatus::Active);
        assert_eq!(MandateStatus::Terminated.as_str(), "terminated");
        assert!("archived".parse::<MandateStatus>().is_err());
    }

    #[test]
    fn test_validate_period() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1);
        let end = NaiveDate::from_ymd_opt(2023, 12, 31);
        assert!(validate_period(start, end).is_err());
        assert!(validate_period(end, start).is_ok());
        assert!(validate_period(start, None).is_ok());
    }
}
