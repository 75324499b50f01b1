// src/models/campaign.rs
// DOCUMENTATION: Email campaigns, recipients and delivery statistics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use super::{OrganisationCategory, PageParams};

string_enum!(
    CampaignStatus {
        Draft => "draft",
        Scheduled => "scheduled",
        Sending => "sending",
        Sent => "sent",
        Failed => "failed",
        Cancelled => "cancelled",
    }
);

impl CampaignStatus {
    /// Content and recipients can only change before sending starts
    pub fn is_editable(&self) -> bool {
        matches!(self, CampaignStatus::Draft | CampaignStatus::Scheduled)
    }
}

string_enum!(
    RecipientStatus {
        Pending => "pending",
        Sent => "sent",
        Failed => "failed",
        Skipped => "skipped",
    }
);

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Campaign {
    pub id: Uuid,
    pub name: String,
    pub subject: String,
    /// HTML body with {{placeholders}}
    pub body_template: String,
    pub from_email: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: CampaignStatus,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub created_by: String,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CampaignRecipient {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub person_id: Option<Uuid>,
    pub email: String,
    #[sqlx(try_from = "String")]
    pub status: RecipientStatus,
    pub error: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub opened_at: Option<DateTime<Utc>>,
    pub clicked_at: Option<DateTime<Utc>>,
    pub unsubscribed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateCampaignRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,

    #[validate(length(min = 1, max = 255))]
    pub subject: String,

    #[validate(length(min = 1))]
    pub body_template: String,

    #[validate(email)]
    #[serde(default)]
    pub from_email: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize, Validate)]
pub struct UpdateCampaignRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,

    #[validate(length(min = 1, max = 255))]
    pub subject: Option<String>,

    #[validate(length(min = 1))]
    pub body_template: Option<String>,

    #[validate(email)]
    pub from_email: Option<String>,
}

/// Body for POST /campaigns/{id}/recipients; selectors are combined (union)
#[derive(Debug, Default, Deserialize)]
pub struct AddRecipientsRequest {
    #[serde(default)]
    pub person_ids: Vec<Uuid>,
    #[serde(default)]
    pub organisation_ids: Vec<Uuid>,
    #[serde(default)]
    pub category: Option<OrganisationCategory>,
}

impl AddRecipientsRequest {
    pub fn is_empty(&self) -> bool {
        self.person_ids.is_empty() && self.organisation_ids.is_empty() && self.category.is_none()
    }
}

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct AddRecipientsResponse {
    /// New recipient rows
    pub added: u64,
    /// Matched people rejected (opt-out, anonymised, inactive, no email, duplicate email)
    pub excluded: u64,
    /// Already present on the campaign
    pub already_present: u64,
}

/// Person considered for a campaign, with what is needed to render the message
#[derive(Debug, Clone, FromRow)]
pub struct RecipientCandidate {
    pub person_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub organisation_name: Option<String>,
    pub email_opt_out: bool,
    pub is_anonymized: bool,
    pub is_active: bool,
}

impl RecipientCandidate {
    pub fn is_contactable(&self) -> bool {
        self.is_active
            && !self.is_anonymized
            && !self.email_opt_out
            && self.email.as_deref().map(|e| !e.trim().is_empty()).unwrap_or(false)
    }
}

/// Pending recipient joined with the person fields used by the template
#[derive(Debug, Clone, FromRow)]
pub struct OutboundMessage {
    pub recipient_id: Uuid,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub organisation_name: Option<String>,
    /// Person opted out or was anonymised after being added
    pub blocked: bool,
}

#[derive(Debug, Deserialize)]
pub struct ScheduleCampaignRequest {
    pub scheduled_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CampaignQuery {
    pub status: Option<CampaignStatus>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl CampaignQuery {
    pub fn page_params(&self) -> PageParams {
        PageParams::new(self.page, self.limit)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RecipientQuery {
    pub status: Option<RecipientStatus>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl RecipientQuery {
    pub fn page_params(&self) -> PageParams {
        PageParams::new(self.page, self.limit)
    }
}

/// Raw counters aggregated in SQL
#[derive(Debug, Default, Clone, FromRow)]
pub struct RecipientCounters {
    pub total: i64,
    pub pending: i64,
    pub sent: i64,
    pub failed: i64,
    pub skipped: i64,
    pub opened: i64,
    pub clicked: i64,
    pub unsubscribed: i64,
}

#[derive(Debug, Serialize)]
pub struct CampaignStats {
    pub campaign_id: Uuid,
    pub status: CampaignStatus,
    pub total: i64,
    pub pending: i64,
    pub sent: i64,
    pub failed: i64,
    pub skipped: i64,
    pub opened: i64,
    pub clicked: i64,
    pub unsubscribed: i64,
    /// opened / sent, 0 when nothing was sent
    pub open_rate: f64,
    /// clicked / sent, 0 when nothing was sent
    pub click_rate: f64,
}

impl CampaignStats {
    pub fn from_counters(campaign_id: Uuid, status: CampaignStatus, c: RecipientCounters) -> Self {
        let rate = |n: i64| {
            if c.sent > 0 {
                ((n as f64 / c.sent as f64) * 10_000.0).round() / 10_000.0
            } else {
                0.0
            }
        };

        Self {
            campaign_id,
            status,
            total: c.total,
            pending: c.pending,
            sent: c.sent,
            failed: c.failed,
            skipped: c.skipped,
            opened: c.opened,
            clicked: c.clicked,
            unsubscribed: c.unsubscribed,
            open_rate: rate(c.opened),
            click_rate: rate(c.clicked),
        }
    }
}

/// Query for GET /t/click/{recipient_id}
#[derive(Debug, Deserialize)]
pub struct ClickQuery {
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rates_are_relative_to_sent() {
        let counters = RecipientCounters {
            total: 10,
            sent: 8,
            failed: 2,
            opened: 4,
            clicked: 1,
            ..Default::default()
        };
        let stats = CampaignStats::from_counters(Uuid::new_v4(), CampaignStatus::Sent, counters);
        assert_eq!(stats.open_rate, 0.5);
        assert_eq!(stats.click_rate, 0.125);
    }

    #[test]
    fn test_rates_without_sends() {
        let stats = CampaignStats::from_counters(
            Uuid::new_v4(),
            CampaignStatus::Draft,
            RecipientCounters::default(),
        );
        assert_eq!(stats.open_rate, 0.0);
        assert_eq!(stats.click_rate, 0.0);
    }

    #[test]
    fn test_candidate_contactability() {
        let mut candidate = RecipientCandidate {
            person_id: Uuid::new_v4(),
            first_name: "Ana".into(),
            last_name: "Ruiz".into(),
            email: Some("ana@example.com".into()),
            organisation_name: None,
            email_opt_out: false,
            is_anonymized: false,
            is_active: true,
        };
        assert!(candidate.is_contactable());

        candidate.email_opt_out = true;
        assert!(!candidate.is_contactable());

        candidate.email_opt_out = false;
        candidate.email = Some("  ".into());
        assert!(!candidate.is_contactable());
    }
}
