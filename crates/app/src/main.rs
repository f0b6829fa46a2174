mod cache;
mod dashboard;
mod problem;
mod router;
mod services;
mod telemetry;

use std::{net::SocketAddr, sync::Arc};

use chrono::Utc;
use tracing::info;

use hr_insights_storage::Database;
use hr_insights_util::{load_env_file, AppConfig};

use crate::cache::{Clock, MemoryCache};
use crate::services::StatsServices;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_env_file();
    let config = AppConfig::from_env()?;

    telemetry::init_tracing(&config)?;
    let metrics = telemetry::init_metrics()?;

    let database = Database::connect(&config.database_url).await?;
    database.run_migrations().await?;
    info!(stage = "app", database_url = %config.database_url, "database ready");

    let clock: Clock = Arc::new(Utc::now);
    let cache = Arc::new(MemoryCache::new(clock.clone()));
    let services = StatsServices::new(
        database,
        cache,
        config.cache_ttls,
        config.recent_activity_days,
        clock,
    );
    let state = router::AppState::new(metrics, services);

    let addr: SocketAddr = config.bind_addr;
    info!(stage = "app", %addr, env = %config.environment.as_str(), "starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router::app_router(state))
        .await
        .map_err(|err| err.into())
}
