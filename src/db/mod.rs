// src/db/mod.rs
// DOCUMENTATION: Database module organization
// PURPOSE: Re-export database components

pub mod campaign_repository;
pub mod compliance_repository;
pub mod interaction_repository;
pub mod mandate_repository;
pub mod notification_repository;
pub mod organisation_repository;
pub mod person_repository;
pub mod webhook_repository;

pub use campaign_repository::*;
pub use compliance_repository::*;
pub use interaction_repository::*;
pub use mandate_repository::*;
pub use notification_repository::*;
pub use organisation_repository::*;
pub use person_repository::*;
pub use webhook_repository::*;
