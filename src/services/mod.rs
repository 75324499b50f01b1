// src/services/mod.rs
// DOCUMENTATION: Services module organization
// PURPOSE: Re-export service components

pub mod ai_client;
pub mod autofill_service;
pub mod cache;
pub mod campaign_service;
pub mod compliance_service;
pub mod dedup;
pub mod email_client;
pub mod events;
pub mod extractor;
pub mod interaction_service;
pub mod mandate_service;
pub mod notification_hub;
pub mod notification_service;
pub mod organisation_service;
pub mod person_service;
pub mod template;
pub mod webhook_service;

pub use ai_client::*;
pub use autofill_service::*;
pub use cache::*;
pub use campaign_service::*;
pub use compliance_service::*;
pub use events::*;
pub use extractor::*;
pub use interaction_service::*;
pub use mandate_service::*;
pub use notification_hub::*;
pub use notification_service::*;
pub use organisation_service::*;
pub use person_service::*;
pub use webhook_service::*;
