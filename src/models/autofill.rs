// src/models/autofill.rs
// DOCUMENTATION: Autofill payloads and create/link/skip decisions

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Contact fields pulled from free text (signature, business card, registry row)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedContact {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub job_title: Option<String>,
    #[serde(default)]
    pub organisation: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
}

impl ExtractedContact {
    /// Drop blank strings so downstream code only sees meaningful values
    pub fn cleaned(self) -> Self {
        fn clean(v: Option<String>) -> Option<String> {
            v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
        }

        Self {
            first_name: clean(self.first_name),
            last_name: clean(self.last_name),
            email: clean(self.email).map(|e| e.to_lowercase()),
            phone: clean(self.phone),
            job_title: clean(self.job_title),
            organisation: clean(self.organisation),
            website: clean(self.website),
            country_code: clean(self.country_code).map(|c| c.to_uppercase()),
        }
    }

    pub fn full_name(&self) -> Option<String> {
        let name = [self.first_name.as_deref(), self.last_name.as_deref()]
            .iter()
            .flatten()
            .copied()
            .collect::<Vec<_>>()
            .join(" ");
        (!name.is_empty()).then_some(name)
    }
}

/// Where the fields came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionSource {
    Ai,
    Heuristic,
    Fields,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ExtractRequest {
    #[validate(length(min = 1, max = 20000))]
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct ExtractResponse {
    pub source: ExtractionSource,
    pub fields: ExtractedContact,
}

/// Body for /autofill/preview and /autofill/apply: either raw text or fields
#[derive(Debug, Default, Deserialize, Serialize, Validate)]
pub struct AutofillRequest {
    #[validate(length(min = 1, max = 20000))]
    #[serde(default)]
    pub text: Option<String>,

    #[serde(default)]
    pub fields: Option<ExtractedContact>,

    /// Free label recorded in the audit trail (e.g. "cssf-import")
    #[validate(length(max = 64))]
    #[serde(default)]
    pub source_label: Option<String>,
}

/// Outcome of the deduplication engine for one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Decision {
    /// No convincing match: create a new record
    Create,
    /// Reuse the matched record
    Link { id: Uuid, score: f64 },
    /// Do nothing; either ambiguous or not enough data
    Skip {
        reason: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        candidate_id: Option<Uuid>,
        score: f64,
    },
}

impl Decision {
    pub fn linked_id(&self) -> Option<Uuid> {
        match self {
            Decision::Link { id, .. } => Some(*id),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Decision::Create => "create",
            Decision::Link { .. } => "link",
            Decision::Skip { .. } => "skip",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AutofillPreview {
    pub source: ExtractionSource,
    pub fields: ExtractedContact,
    pub organisation: Decision,
    pub person: Decision,
}

#[derive(Debug, Serialize)]
pub struct AutofillResult {
    pub source: ExtractionSource,
    pub fields: ExtractedContact,
    pub organisation: Decision,
    pub person: Decision,
    pub organisation_id: Option<Uuid>,
    pub person_id: Option<Uuid>,
    /// Whether a person-organisation link was created by this call
    pub linked: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cleaned_drops_blanks_and_normalizes_case() {
        let contact = ExtractedContact {
            first_name: Some("  Marie ".into()),
            last_name: Some("".into()),
            email: Some("Marie.Dupont@Example.COM".into()),
            country_code: Some("fr".into()),
            ..Default::default()
        }
        .cleaned();

        assert_eq!(contact.first_name.as_deref(), Some("Marie"));
        assert_eq!(contact.last_name, None);
        assert_eq!(contact.email.as_deref(), Some("marie.dupont@example.com"));
        assert_eq!(contact.country_code.as_deref(), Some("FR"));
        assert_eq!(contact.full_name().as_deref(), Some("Marie"));
    }

    #[test]
    fn test_decision_serialization() {
        let id = Uuid::new_v4();
        let json = serde_json::to_value(Decision::Link { id, score: 1.0 }).unwrap();
        assert_eq!(json["action"], "link");
        assert_eq!(json["id"], id.to_string());

        let json = serde_json::to_value(Decision::Skip {
            reason: "insufficient data".into(),
            candidate_id: None,
            score: 0.0,
        })
        .unwrap();
        assert_eq!(json["action"], "skip");
        assert!(json.get("candidate_id").is_none());
    }
}
