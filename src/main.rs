use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpServer, Responder, get};
use std::sync::Arc;

mod api;
mod config;
mod db;
mod docs;
mod error;
mod model;
mod presenter;
mod routes;
mod service;
mod store;
mod utils;

use config::{Config, StoreBackend};
use db::{init_db, run_migrations};

use crate::docs::ApiDoc;
use crate::service::{AttendanceService, PayrollService};
use crate::store::HrStore;
use crate::store::memory::InMemoryStore;
use crate::store::mysql::MySqlStore;
use crate::utils::query_cache::QueryCache;
use anyhow::Context;
use tracing::{info, warn};
use tracing_appender::rolling;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[get("/")]
async fn index() -> impl Responder {
    "HR core is running"
}

async fn build_store(config: &Config) -> anyhow::Result<Arc<dyn HrStore>> {
    match config.store_backend {
        StoreBackend::Mysql => {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL must be set")?;
            let pool = init_db(url).await?;
            if config.run_migrations {
                run_migrations(&pool).await?;
                info!("Migrations applied");
            }
            Ok(Arc::new(MySqlStore::new(pool)))
        }
        StoreBackend::Memory => {
            warn!(
                profiles = config.memory_profiles.len(),
                "Using the in-memory store; data is lost on restart"
            );
            let store = config
                .memory_profiles
                .iter()
                .fold(InMemoryStore::new(), |store, &(user, company)| {
                    store.with_profile(user, company)
                });
            Ok(Arc::new(store))
        }
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    // Rolling daily log
    let file_appender = rolling::daily(&config.log_dir, "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .pretty()
        .init();

    info!(backend = %config.store_backend, "Server starting...");

    let store = build_store(&config).await?;
    let retry = config.retry_policy();

    // One cache per service so invalidation stays within its own keys
    let attendance = Data::new(AttendanceService::new(
        store.clone(),
        QueryCache::new(config.cache_ttl()),
        retry,
    ));
    let payroll = Data::new(PayrollService::new(
        store.clone(),
        QueryCache::new(config.cache_ttl()),
        retry,
    ));
    let store_data = Data::new(store);

    let server_addr = config.server_addr.clone();
    let config_data = config.clone();

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(store_data.clone())
            .app_data(attendance.clone())
            .app_data(payroll.clone())
            .service(index)
            .service(api::health::health)
            .configure(|cfg| routes::configure(cfg, &config_data))
    })
    .bind(&server_addr)
    .with_context(|| format!("Failed to bind {server_addr}"))?
    .run()
    .await?;

    info!("Server stopped");
    Ok(())
}
