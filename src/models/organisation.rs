// src/models/organisation.rs
// DOCUMENTATION: Core data structures for organisations
// PURPOSE: Database rows, request DTOs and responses for /organisations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use super::PageParams;

string_enum!(
    /// Business relationship with the organisation
    OrganisationCategory {
        Client => "client",
        Prospect => "prospect",
        Distributor => "distributor",
        Supplier => "supplier",
        Partner => "partner",
        Institution => "institution",
        Other => "other",
    }
);

string_enum!(
    /// Commercial pipeline position
    PipelineStage {
        Lead => "lead",
        Qualified => "qualified",
        Proposal => "proposal",
        Signed => "signed",
        Lost => "lost",
    }
);

/// Represents a complete organisation record from the database
/// DOCUMENTATION: Maps directly to the organisations table
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Organisation {
    pub id: Uuid,

    pub name: String,

    #[sqlx(try_from = "String")]
    pub category: OrganisationCategory,

    /// ISO 3166-1 alpha-2
    pub country_code: Option<String>,

    pub city: Option<String>,

    pub address: Option<String>,

    pub website: Option<String>,

    pub email: Option<String>,

    pub phone: Option<String>,

    /// Registrable domain derived from website (or email), used for deduplication
    pub domain: Option<String>,

    /// Assets under management, in EUR
    pub aum: Option<f64>,

    #[sqlx(try_from = "String")]
    pub pipeline_stage: PipelineStage,

    pub notes: Option<String>,

    /// Soft delete flag (true = active, false = deleted)
    pub is_active: bool,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Request DTO for creating a new organisation
/// DOCUMENTATION: Data transfer object for POST /organisations
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct CreateOrganisationRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,

    #[serde(default)]
    pub category: Option<OrganisationCategory>,

    #[validate(length(equal = 2))]
    #[serde(default)]
    pub country_code: Option<String>,

    #[validate(length(max = 120))]
    #[serde(default)]
    pub city: Option<String>,

    #[serde(default)]
    pub address: Option<String>,

    #[validate(url)]
    #[serde(default)]
    pub website: Option<String>,

    #[validate(email)]
    #[serde(default)]
    pub email: Option<String>,

    #[validate(length(max = 64))]
    #[serde(default)]
    pub phone: Option<String>,

    #[validate(range(min = 0.0))]
    #[serde(default)]
    pub aum: Option<f64>,

    #[serde(default)]
    pub pipeline_stage: Option<PipelineStage>,

    #[serde(default)]
    pub notes: Option<String>,
}

/// Request DTO for updating an existing organisation
/// DOCUMENTATION: All fields are optional - only provided fields are updated
#[derive(Debug, Default, Serialize, Deserialize, Validate)]
pub struct UpdateOrganisationRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,

    pub category: Option<OrganisationCategory>,

    #[validate(length(equal = 2))]
    pub country_code: Option<String>,

    #[validate(length(max = 120))]
    pub city: Option<String>,

    pub address: Option<String>,

    #[validate(url)]
    pub website: Option<String>,

    #[validate(email)]
    pub email: Option<String>,

    #[validate(length(max = 64))]
    pub phone: Option<String>,

    #[validate(range(min = 0.0))]
    pub aum: Option<f64>,

    pub pipeline_stage: Option<PipelineStage>,

    pub notes: Option<String>,
}

/// Query parameters for GET /organisations
#[derive(Debug, Default, Deserialize)]
pub struct OrganisationQuery {
    /// Case-insensitive substring of the name
    pub q: Option<String>,
    pub category: Option<OrganisationCategory>,
    pub country_code: Option<String>,
    pub city: Option<String>,
    pub pipeline_stage: Option<PipelineStage>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl OrganisationQuery {
    pub fn page_params(&self) -> PageParams {
        PageParams::new(self.page, self.limit)
    }
}

/// Person attached to an organisation, as shown on the organisation page
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct OrganisationMember {
    pub person_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub job_title: Option<String>,
    pub work_email: Option<String>,
    pub is_primary: bool,
}

/// Detailed response DTO
/// DOCUMENTATION: Used for GET /organisations/{id}
#[derive(Debug, Serialize)]
pub struct OrganisationDetail {
    #[serde(flatten)]
    pub organisation: Organisation,
    pub people: Vec<OrganisationMember>,
    pub mandate_count: i64,
    pub interaction_count: i64,
}
