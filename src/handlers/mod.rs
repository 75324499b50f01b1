// src/handlers/mod.rs
// DOCUMENTATION: Handlers module organization
// PURPOSE: Re-export handler components

pub mod admin;
pub mod auth;
pub mod autofill;
pub mod campaigns;
pub mod compliance;
pub mod dashboard;
pub mod health;
pub mod interactions;
pub mod mandates;
pub mod notifications;
pub mod organisations;
pub mod people;
pub mod tracking;
pub mod webhooks;

pub use admin::config as admin_config;
pub use autofill::config as autofill_config;
pub use campaigns::config as campaigns_config;
pub use compliance::config as compliance_config;
pub use dashboard::config as dashboard_config;
pub use health::config as health_config;
pub use interactions::config as interactions_config;
pub use mandates::config as mandates_config;
pub use notifications::config as notifications_config;
pub use organisations::config as organisations_config;
pub use people::config as people_config;
pub use tracking::config as tracking_config;
pub use webhooks::config as webhooks_config;

/// Every bearer-protected route, mounted under /api/v1
pub fn api_config(cfg: &mut actix_web::web::ServiceConfig) {
    cfg.configure(organisations_config)
        .configure(people_config)
        .configure(interactions_config)
        .configure(mandates_config)
        .configure(campaigns_config)
        .configure(autofill_config)
        .configure(compliance_config)
        .configure(webhooks_config)
        .configure(notifications_config)
        .configure(dashboard_config);
}

/// Shared application state for handler tests
/// DOCUMENTATION: the pool is lazy, so only requests rejected before touching
/// the database can be exercised without a running Postgres
#[cfg(test)]
pub(crate) mod test_support {
    use crate::config::Config;
    use crate::services::email_client::LogEmailSender;
    use crate::services::{AiCache, CampaignSender, ContactExtractor, EventPublisher, NotificationHub, WebhookDispatcher};
    use actix_web::{test::TestRequest, web};
    use sqlx::postgres::PgPoolOptions;
    use sqlx::PgPool;
    use std::sync::Arc;

    pub(crate) struct TestState {
        pub config: Config,
        pub pool: PgPool,
        pub publisher: EventPublisher,
        pub extractor: ContactExtractor,
        pub sender: CampaignSender,
    }

    impl TestState {
        pub(crate) fn register(&self, cfg: &mut web::ServiceConfig) {
            cfg.app_data(web::Data::new(self.config.clone()))
                .app_data(web::Data::new(self.pool.clone()))
                .app_data(web::Data::new(self.publisher.clone()))
                .app_data(web::Data::new(self.extractor.clone()))
                .app_data(web::Data::new(self.sender.clone()));
        }
    }

    /// Must be called inside a runtime: the lazy pool spawns its maintenance task
    pub(crate) fn test_state() -> TestState {
        let config = Config::for_tests();
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/crm_unused")
            .expect("lazy pool");

        let dispatcher = WebhookDispatcher::new(pool.clone(), 2, 1);
        let publisher = EventPublisher::new(pool.clone(), dispatcher, NotificationHub::default());
        let extractor = ContactExtractor::new(None, Arc::new(AiCache::new(60)));
        let sender = CampaignSender::new(pool.clone(), publisher.clone(), Arc::new(LogEmailSender), &config);

        TestState {
            config,
            pool,
            publisher,
            extractor,
            sender,
        }
    }

    /// Adds the bearer token accepted by `Config::for_tests`
    pub(crate) fn api_request(req: TestRequest) -> TestRequest {
        req.insert_header(("Authorization", "Bearer test-api-token"))
    }
}
