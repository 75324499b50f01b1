// src/main.rs
// DOCUMENTATION: Application entry point
// PURPOSE: Initialize config, database, background tasks and start HTTP server

mod config;
mod db;
mod errors;
mod handlers;
mod models;
mod services;

use actix_web::{middleware::Logger, web, App, HttpServer};
use config::Config;
use dotenv::dotenv;
use services::email_client::email_sender_from_config;
use services::{
    start_cleanup_task, start_scheduler, AiCache, AiClient, CampaignSender, ContactExtractor, EventPublisher,
    NotificationHub, WebhookDispatcher,
};
use std::io;
use std::sync::Arc;

/// Seconds between two scans for due scheduled campaigns
const SCHEDULER_INTERVAL_SECS: u64 = 30;

#[actix_web::main]
async fn main() -> io::Result<()> {
    // 1. Load environment variables
    dotenv().ok();

    // 2. Load configuration
    let config = Config::from_env();
    if let Err(e) = config.validate() {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    }

    // 3. Initialize logging
    if std::env::var("RUST_LOG").is_err() {
        let log_level = if !config.log_level.is_empty() {
            &config.log_level
        } else {
            "info,actix_web=info,sqlx=warn"
        };
        std::env::set_var("RUST_LOG", log_level);
    }
    env_logger::init();

    log::info!("Starting CRM API...");
    log::info!("Environment: {}", config.environment);
    log::info!("Server Address: {}:{}", config.server_address, config.server_port);

    // 4. Initialize database connection pool
    let pool = match config::init_db_pool(&config).await {
        Ok(pool) => pool,
        Err(e) => {
            log::error!("Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    };

    if config.run_migrations {
        if let Err(e) = config::run_migrations(&pool).await {
            log::error!("Failed to apply migrations: {}", e);
            std::process::exit(1);
        }
    }

    // 5. AI extraction cache and client
    let cache = Arc::new(AiCache::new(config.ai_cache_ttl_seconds));
    start_cleanup_task(cache.clone(), 300);
    let ai = AiClient::from_config(&config);
    log::info!(
        "AI extraction: {} (cache TTL {}s)",
        if ai.is_some() { "enabled" } else { "heuristics only" },
        config.ai_cache_ttl_seconds
    );
    let extractor = ContactExtractor::new(ai, cache);

    // 6. Events: webhooks out, notifications to live streams
    let dispatcher = WebhookDispatcher::new(
        pool.clone(),
        config.webhook_timeout_seconds,
        config.webhook_max_attempts,
    );
    let publisher = EventPublisher::new(pool.clone(), dispatcher, NotificationHub::default());

    // 7. Campaign delivery and scheduler
    let email = email_sender_from_config(&config);
    log::info!("Email provider: {}", email.name());
    let sender = CampaignSender::new(pool.clone(), publisher.clone(), email, &config);
    start_scheduler(sender.clone(), SCHEDULER_INTERVAL_SECS);

    // 8. Start HTTP server
    let server_addr = format!("{}:{}", config.server_address, config.server_port);
    let config_clone = config.clone();

    HttpServer::new(move || {
        App::new()
            // Application state
            .app_data(web::Data::new(pool.clone()))
            .app_data(web::Data::new(config_clone.clone()))
            .app_data(web::Data::new(publisher.clone()))
            .app_data(web::Data::new(extractor.clone()))
            .app_data(web::Data::new(sender.clone()))
            // Middleware
            .wrap(Logger::default())
            .wrap(actix_web::middleware::Compress::default())
            // Routes
            .configure(handlers::health_config)
            .configure(handlers::tracking_config)
            .configure(handlers::admin_config)
            .service(web::scope("/api/v1").configure(handlers::api_config))
    })
    .bind(&server_addr)?
    .run()
    .await
}
