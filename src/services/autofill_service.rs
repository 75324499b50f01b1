// src/services/autofill_service.rs
// DOCUMENTATION: AI-assisted autofill
// PURPOSE: Extract contact fields, plan create/link/skip per entity, apply the plan

use crate::db::{ComplianceRepository, OrganisationRepository, PersonRepository};
use crate::errors::CrmError;
use crate::models::*;
use crate::services::{dedup, AiCache, AiClient, EventPublisher, HeuristicExtractor};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

/// Turns free text into contact fields
/// DOCUMENTATION: provider answers are cached by content hash; the heuristic parser
/// covers a missing provider, provider errors and empty answers
#[derive(Clone)]
pub struct ContactExtractor {
    ai: Option<AiClient>,
    cache: Arc<AiCache>,
}

impl ContactExtractor {
    pub fn new(ai: Option<AiClient>, cache: Arc<AiCache>) -> Self {
        Self { ai, cache }
    }

    pub fn cache(&self) -> &Arc<AiCache> {
        &self.cache
    }

    pub fn ai_enabled(&self) -> bool {
        self.ai.is_some()
    }

    pub async fn extract(&self, text: &str) -> (ExtractionSource, ExtractedContact) {
        if let Some(ai) = &self.ai {
            match self.extract_with_ai(ai, text).await {
                Ok(fields) if has_identity(&fields) => return (ExtractionSource::Ai, fields),
                Ok(_) => log::debug!("AI extraction found no identity, using heuristics"),
                Err(e) => log::warn!("AI extraction failed, using heuristics: {}", e),
            }
        }

        (ExtractionSource::Heuristic, HeuristicExtractor::extract(text))
    }

    async fn extract_with_ai(&self, ai: &AiClient, text: &str) -> Result<ExtractedContact, CrmError> {
        let key = AiCache::generate_key(ai.model(), text);

        if let Some(cached) = self.cache.get(&key).await {
            log::debug!("AI extraction served from cache ({})", key);
            return AiClient::parse_content(&cached);
        }

        log::debug!("AI extraction not cached, calling provider ({})", key);
        let raw = ai.extract_raw(text).await?;
        let fields = AiClient::parse_content(&raw)?;
        self.cache.set(key, raw).await;
        Ok(fields)
    }
}

/// Name, email or organisation: something the decision engine can work with
fn has_identity(fields: &ExtractedContact) -> bool {
    fields.full_name().is_some() || fields.email.is_some() || fields.organisation.is_some()
}

/// Result of the planning step
struct Plan {
    domain: Option<String>,
    organisation: Decision,
    person: Decision,
}

pub struct AutofillService;

impl AutofillService {
    pub async fn extract(extractor: &ContactExtractor, req: ExtractRequest) -> Result<ExtractResponse, CrmError> {
        req.validate()?;
        let (source, fields) = extractor.extract(&req.text).await;
        Ok(ExtractResponse { source, fields })
    }

    pub async fn preview(
        pool: &PgPool,
        extractor: &ContactExtractor,
        req: AutofillRequest,
    ) -> Result<AutofillPreview, CrmError> {
        let (source, fields) = Self::resolve_fields(extractor, &req).await?;
        let plan = Self::plan(pool, &fields).await?;

        Ok(AutofillPreview {
            source,
            fields,
            organisation: plan.organisation,
            person: plan.person,
        })
    }

    /// Execute the plan: create or reuse records, link them, audit the personal data written
    pub async fn apply(
        pool: &PgPool,
        publisher: &EventPublisher,
        extractor: &ContactExtractor,
        actor: &str,
        ip: Option<String>,
        req: AutofillRequest,
    ) -> Result<AutofillResult, CrmError> {
        let (source, fields) = Self::resolve_fields(extractor, &req).await?;
        let plan = Self::plan(pool, &fields).await?;

        let mut tx = pool
            .begin()
            .await
            .map_err(|e| CrmError::from_db("Failed to open transaction", e))?;

        let created_organisation = match &plan.organisation {
            Decision::Create => Some(
                OrganisationRepository::create(&mut *tx, &organisation_request(&fields), plan.domain.as_deref())
                    .await?,
            ),
            _ => None,
        };
        let organisation_id = match &plan.organisation {
            Decision::Link { id, .. } => Some(*id),
            _ => created_organisation.as_ref().map(|o| o.id),
        };

        let created_person = match &plan.person {
            Decision::Create => Some(PersonRepository::create(&mut *tx, &person_request(&fields)).await?),
            _ => None,
        };
        let person_id = match &plan.person {
            Decision::Link { id, .. } => Some(*id),
            _ => created_person.as_ref().map(|p| p.id),
        };

        let linked = match (person_id, organisation_id) {
            (Some(person_id), Some(organisation_id)) => {
                let link = LinkOrganisationRequest {
                    job_title: fields.job_title.clone().filter(|t| t.chars().count() <= MAX_JOB_TITLE),
                    work_email: None,
                    is_primary: plan.person == Decision::Create,
                };
                PersonRepository::link_organisation_in(&mut tx, person_id, organisation_id, &link).await?
            }
            _ => false,
        };

        if let Some(person_id) = person_id {
            let entry = NewComplianceLog::person(actor, ComplianceAction::Autofill, person_id)
                .with_details(json!({
                    "source": source,
                    "source_label": req.source_label,
                    "person_decision": plan.person.label(),
                    "organisation_decision": plan.organisation.label(),
                    "organisation_id": organisation_id,
                }))
                .with_ip(ip);
            ComplianceRepository::insert(&mut *tx, &entry).await?;
        }

        tx.commit()
            .await
            .map_err(|e| CrmError::from_db("Failed to commit autofill", e))?;

        if let Some(organisation) = &created_organisation {
            publisher.emit("organisation.created", organisation);
        }
        if let Some(person) = &created_person {
            publisher.emit("person.created", person);
        }

        if let Decision::Skip { candidate_id: Some(candidate), reason, .. } = &plan.person {
            Self::flag_for_review(publisher, actor, &fields, *candidate, reason).await;
        }

        log::info!(
            "Autofill by {}: organisation {} -> {:?}, person {} -> {:?}",
            actor,
            plan.organisation.label(),
            organisation_id,
            plan.person.label(),
            person_id
        );

        let result = AutofillResult {
            source,
            fields,
            organisation: plan.organisation,
            person: plan.person,
            organisation_id,
            person_id,
            linked,
        };
        publisher.emit("autofill.applied", &result);
        Ok(result)
    }

    async fn resolve_fields(
        extractor: &ContactExtractor,
        req: &AutofillRequest,
    ) -> Result<(ExtractionSource, ExtractedContact), CrmError> {
        req.validate()?;
        match (&req.fields, &req.text) {
            (Some(fields), _) => Ok((ExtractionSource::Fields, fields.clone().cleaned())),
            (None, Some(text)) => Ok(extractor.extract(text).await),
            (None, None) => Err(CrmError::InvalidInput("give either text or fields".to_string())),
        }
    }

    /// Look up candidates and run the decision engine; no writes
    async fn plan(pool: &PgPool, fields: &ExtractedContact) -> Result<Plan, CrmError> {
        let domain = dedup::derive_domain(fields.website.as_deref(), fields.email.as_deref());
        let name_token = fields.organisation.as_deref().and_then(dedup::significant_token);

        let organisations =
            OrganisationRepository::find_candidates(pool, domain.as_deref(), name_token.as_deref()).await?;
        let organisation = require_valid(
            dedup::decide_organisation(fields, domain.as_deref(), &organisations),
            organisation_request(fields).validate(),
            "organisation",
        );

        let people =
            PersonRepository::find_candidates(pool, fields.email.as_deref(), fields.last_name.as_deref()).await?;
        let person_ids: Vec<Uuid> = people.iter().map(|p| p.id).collect();
        let links = PersonRepository::organisation_ids_of(pool, &person_ids).await?;
        let person = require_valid(
            dedup::decide_person(fields, &people, &links, organisation.linked_id()),
            person_request(fields).validate(),
            "person",
        );

        log::debug!(
            "Autofill plan: {} organisation candidate(s), {} person candidate(s) -> {} / {}",
            organisations.len(),
            people.len(),
            organisation.label(),
            person.label()
        );

        Ok(Plan {
            domain,
            organisation,
            person,
        })
    }

    async fn flag_for_review(
        publisher: &EventPublisher,
        actor: &str,
        fields: &ExtractedContact,
        candidate: Uuid,
        reason: &str,
    ) {
        let who = fields
            .full_name()
            .or_else(|| fields.email.clone())
            .unwrap_or_else(|| "contact".to_string());

        publisher
            .notify_quietly(CreateNotificationRequest {
                recipient: actor.to_string(),
                kind: NotificationKind::Autofill,
                title: format!("Autofill skipped {}: {}", who, reason),
                message: Some("Review the existing record before creating another one".to_string()),
                link: Some(format!("/people/{}", candidate)),
                resource_type: Some("person".to_string()),
                resource_id: Some(candidate),
            })
            .await;
    }
}

/// Same bound as the person-organisation link column
const MAX_JOB_TITLE: usize = 255;

/// A planned create whose request would not pass validation is skipped instead
fn require_valid(
    decision: Decision,
    check: Result<(), validator::ValidationErrors>,
    entity: &str,
) -> Decision {
    match (decision, check) {
        (Decision::Create, Err(e)) => {
            log::debug!("Autofill {} fields rejected: {}", entity, e);
            Decision::Skip {
                reason: format!("invalid {} fields", entity),
                candidate_id: None,
                score: 0.0,
            }
        }
        (decision, _) => decision,
    }
}

/// Websites without a scheme are assumed https
fn sanitize_website(website: Option<&str>) -> Option<String> {
    let website = website?.trim();
    if website.is_empty() || website.contains(char::is_whitespace) {
        return None;
    }
    if website.starts_with("http://") || website.starts_with("https://") {
        Some(website.to_string())
    } else {
        Some(format!("https://{}", website))
    }
}

fn sanitize_country(code: Option<&str>) -> Option<String> {
    code.map(str::trim)
        .filter(|c| c.len() == 2 && c.chars().all(|ch| ch.is_ascii_alphabetic()))
        .map(str::to_uppercase)
}

fn organisation_request(fields: &ExtractedContact) -> CreateOrganisationRequest {
    CreateOrganisationRequest {
        name: fields.organisation.clone().unwrap_or_default(),
        category: Some(OrganisationCategory::Prospect),
        country_code: sanitize_country(fields.country_code.as_deref()),
        website: sanitize_website(fields.website.as_deref()),
        pipeline_stage: Some(PipelineStage::Lead),
        ..Default::default()
    }
}

fn person_request(fields: &ExtractedContact) -> CreatePersonRequest {
    CreatePersonRequest {
        first_name: fields.first_name.clone().unwrap_or_default(),
        last_name: fields.last_name.clone().unwrap_or_default(),
        email: fields.email.as_deref().and_then(dedup::normalize_email),
        phone: fields.phone.clone(),
        job_title: fields.job_title.clone(),
        country_code: sanitize_country(fields.country_code.as_deref()),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact() -> ExtractedContact {
        ExtractedContact {
            first_name: Some("Jean".into()),
            last_name: Some("Muller".into()),
            email: Some("jean.muller@acme-capital.lu".into()),
            phone: Some("+352 26 12 34 56".into()),
            job_title: Some("Head of Distribution".into()),
            organisation: Some("Acme Capital S.A.".into()),
            website: Some("acme-capital.lu".into()),
            country_code: Some("lu".into()),
        }
    }

    #[test]
    fn test_has_identity() {
        assert!(has_identity(&contact()));
        assert!(!has_identity(&ExtractedContact::default()));
        assert!(has_identity(&ExtractedContact {
            organisation: Some("Acme".into()),
            ..Default::default()
        }));
    }

    #[test]
    fn test_sanitizers() {
        assert_eq!(sanitize_website(Some("acme.lu")).as_deref(), Some("https://acme.lu"));
        assert_eq!(sanitize_website(Some("http://acme.lu")).as_deref(), Some("http://acme.lu"));
        assert_eq!(sanitize_website(Some("not a url")), None);
        assert_eq!(sanitize_website(None), None);

        assert_eq!(sanitize_country(Some("lu")).as_deref(), Some("LU"));
        assert_eq!(sanitize_country(Some("Luxembourg")), None);
        assert_eq!(sanitize_country(Some("1A")), None);
    }

    #[test]
    fn test_requests_built_from_fields() {
        let org = organisation_request(&contact());
        assert_eq!(org.name, "Acme Capital S.A.");
        assert_eq!(org.website.as_deref(), Some("https://acme-capital.lu"));
        assert_eq!(org.country_code.as_deref(), Some("LU"));
        assert_eq!(org.category, Some(OrganisationCategory::Prospect));
        assert!(org.validate().is_ok());

        let person = person_request(&contact());
        assert_eq!(person.first_name, "Jean");
        assert_eq!(person.email.as_deref(), Some("jean.muller@acme-capital.lu"));
        assert!(person.organisation_id.is_none());
        assert!(person.validate().is_ok());
    }

    #[test]
    fn test_oversized_fields_turn_create_into_skip() {
        let fields = ExtractedContact {
            first_name: Some("a".repeat(200)),
            phone: Some("1".repeat(100)),
            organisation: Some("o".repeat(300)),
            ..contact()
        };

        let org_check = organisation_request(&fields).validate();
        let person_check = person_request(&fields).validate();
        assert!(org_check.is_err());
        assert!(person_check.is_err());

        let organisation = require_valid(Decision::Create, org_check, "organisation");
        assert!(matches!(
            &organisation,
            Decision::Skip { reason, candidate_id: None, .. } if reason == "invalid organisation fields"
        ));
        assert!(matches!(require_valid(Decision::Create, person_check, "person"), Decision::Skip { .. }));

        // Linking an existing record never writes the extracted fields
        let id = Uuid::new_v4();
        let linked = require_valid(
            Decision::Link { id, score: 1.0 },
            organisation_request(&fields).validate(),
            "organisation",
        );
        assert_eq!(linked, Decision::Link { id, score: 1.0 });
    }

    #[test]
    fn test_valid_create_is_kept() {
        let check = person_request(&contact()).validate();
        assert_eq!(require_valid(Decision::Create, check, "person"), Decision::Create);
    }

    #[tokio::test]
    async fn test_extractor_without_provider_uses_heuristics() {
        let extractor = ContactExtractor::new(None, Arc::new(AiCache::new(60)));
        assert!(!extractor.ai_enabled());

        let (source, fields) = extractor
            .extract("Jean Muller\nHead of Distribution\nAcme Capital S.A.\njean.muller@acme-capital.lu")
            .await;
        assert_eq!(source, ExtractionSource::Heuristic);
        assert_eq!(fields.email.as_deref(), Some("jean.muller@acme-capital.lu"));
    }

    #[tokio::test]
    async fn test_extractor_serves_cached_provider_answer() {
        let cache = Arc::new(AiCache::new(60));
        let ai = AiClient::new("http://127.0.0.1:9/unused".into(), "key".into(), "model-x".into(), 10);
        let text = "Contact: Ana Ruiz";
        cache
            .set(
                AiCache::generate_key("model-x", text),
                r#"{"first_name":"Ana","last_name":"Ruiz","email":"ana@ruiz.es"}"#.to_string(),
            )
            .await;

        let extractor = ContactExtractor::new(Some(ai), cache);
        let (source, fields) = extractor.extract(text).await;
        assert_eq!(source, ExtractionSource::Ai);
        assert_eq!(fields.last_name.as_deref(), Some("Ruiz"));
        assert_eq!(fields.email.as_deref(), Some("ana@ruiz.es"));
    }
}
