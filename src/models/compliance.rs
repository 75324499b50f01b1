// src/models/compliance.rs
// DOCUMENTATION: RGPD audit trail and data-subject request payloads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

use super::{CampaignRecipient, Interaction, PageParams, Person, PersonOrganisation};

string_enum!(
    ComplianceAction {
        Access => "access",
        Export => "export",
        Update => "update",
        Anonymize => "anonymize",
        Delete => "delete",
        ConsentGiven => "consent_given",
        ConsentWithdrawn => "consent_withdrawn",
        Autofill => "autofill",
        Retention => "retention",
    }
);

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ComplianceLog {
    pub id: Uuid,
    pub actor: String,
    #[sqlx(try_from = "String")]
    pub action: ComplianceAction,
    pub entity_type: String,
    pub entity_id: Option<Uuid>,
    pub details: Option<Value>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Entry to append to the audit trail
#[derive(Debug, Clone)]
pub struct NewComplianceLog {
    pub actor: String,
    pub action: ComplianceAction,
    pub entity_type: String,
    pub entity_id: Option<Uuid>,
    pub details: Option<Value>,
    pub ip_address: Option<String>,
}

impl NewComplianceLog {
    pub fn person(actor: &str, action: ComplianceAction, person_id: Uuid) -> Self {
        Self {
            actor: actor.to_string(),
            action,
            entity_type: "person".to_string(),
            entity_id: Some(person_id),
            details: None,
            ip_address: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_ip(mut self, ip: Option<String>) -> Self {
        self.ip_address = ip;
        self
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ComplianceQuery {
    pub entity_type: Option<String>,
    pub entity_id: Option<Uuid>,
    pub action: Option<ComplianceAction>,
    pub actor: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl ComplianceQuery {
    pub fn page_params(&self) -> PageParams {
        PageParams::new(self.page, self.limit)
    }
}

/// Right of access: everything held about one person
#[derive(Debug, Serialize)]
pub struct PersonExport {
    pub exported_at: DateTime<Utc>,
    pub person: Person,
    pub organisations: Vec<PersonOrganisation>,
    pub interactions: Vec<Interaction>,
    pub campaign_recipients: Vec<CampaignRecipient>,
    pub compliance_logs: Vec<ComplianceLog>,
}

#[derive(Debug, Deserialize)]
pub struct RetentionQuery {
    pub days: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct RetentionReport {
    pub days: i64,
    pub cutoff: DateTime<Utc>,
    pub anonymized: usize,
    pub person_ids: Vec<Uuid>,
}
