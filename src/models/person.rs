// src/models/person.rs
// DOCUMENTATION: Core data structures for people (contacts)
// PURPOSE: Database rows, request DTOs and responses for /people

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use super::PageParams;

/// Placeholder written over names on anonymisation
pub const ANONYMIZED_LABEL: &str = "Anonymised";

/// Represents a complete person record from the database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Person {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub mobile: Option<String>,
    pub job_title: Option<String>,
    pub linkedin_url: Option<String>,
    pub country_code: Option<String>,
    pub language: Option<String>,

    /// RGPD consent: true once the person refused marketing emails
    pub email_opt_out: bool,
    pub opted_out_at: Option<DateTime<Utc>>,

    /// Set by the right-to-erasure flow; PII columns are cleared
    pub is_anonymized: bool,

    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Person {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }

    /// Whether marketing email may be sent to this person
    pub fn is_contactable(&self) -> bool {
        self.is_active && !self.is_anonymized && !self.email_opt_out && self.email.is_some()
    }
}

/// Request DTO for POST /people
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct CreatePersonRequest {
    #[validate(length(min = 1, max = 120))]
    pub first_name: String,

    #[validate(length(min = 1, max = 120))]
    pub last_name: String,

    #[validate(email)]
    #[serde(default)]
    pub email: Option<String>,

    #[validate(length(max = 64))]
    #[serde(default)]
    pub phone: Option<String>,

    #[validate(length(max = 64))]
    #[serde(default)]
    pub mobile: Option<String>,

    #[validate(length(max = 255))]
    #[serde(default)]
    pub job_title: Option<String>,

    #[validate(url)]
    #[serde(default)]
    pub linkedin_url: Option<String>,

    #[validate(length(equal = 2))]
    #[serde(default)]
    pub country_code: Option<String>,

    #[validate(length(min = 2, max = 8))]
    #[serde(default)]
    pub language: Option<String>,

    /// Optional organisation to link as primary employer
    #[serde(default)]
    pub organisation_id: Option<Uuid>,
}

/// Request DTO for PUT /people/{id}
#[derive(Debug, Default, Serialize, Deserialize, Validate)]
pub struct UpdatePersonRequest {
    #[validate(length(min = 1, max = 120))]
    pub first_name: Option<String>,

    #[validate(length(min = 1, max = 120))]
    pub last_name: Option<String>,

    #[validate(email)]
    pub email: Option<String>,

    #[validate(length(max = 64))]
    pub phone: Option<String>,

    #[validate(length(max = 64))]
    pub mobile: Option<String>,

    #[validate(length(max = 255))]
    pub job_title: Option<String>,

    #[validate(url)]
    pub linkedin_url: Option<String>,

    #[validate(length(equal = 2))]
    pub country_code: Option<String>,

    #[validate(length(min = 2, max = 8))]
    pub language: Option<String>,
}

/// Query parameters for GET /people
#[derive(Debug, Default, Deserialize)]
pub struct PersonQuery {
    /// Matches first name, last name or email
    pub q: Option<String>,
    pub organisation_id: Option<Uuid>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl PersonQuery {
    pub fn page_params(&self) -> PageParams {
        PageParams::new(self.page, self.limit)
    }
}

/// Body for POST /people/{id}/organisations/{organisation_id}
#[derive(Debug, Default, Deserialize, Validate)]
pub struct LinkOrganisationRequest {
    #[validate(length(max = 255))]
    pub job_title: Option<String>,

    #[validate(email)]
    pub work_email: Option<String>,

    #[serde(default)]
    pub is_primary: bool,
}

/// Organisation membership as seen from the person
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PersonOrganisation {
    pub organisation_id: Uuid,
    pub organisation_name: String,
    pub job_title: Option<String>,
    pub work_email: Option<String>,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
}

/// Detailed response DTO for GET /people/{id}
#[derive(Debug, Serialize)]
pub struct PersonDetail {
    #[serde(flatten)]
    pub person: Person,
    pub organisations: Vec<PersonOrganisation>,
}

/// Body for POST /people/{id}/consent
#[derive(Debug, Deserialize)]
pub struct ConsentRequest {
    pub email_opt_out: bool,
}
