//! Demo server: settings from TG_* env, live PostgreSQL source by default,
//! in-memory fixtures with TABLEGATE_FIXTURES=1, grant-based access with
//! TABLEGATE_ACCESS=grants.

use axum::Router;
use std::sync::Arc;
use tablegate::{
    api_routes, common_routes, AccessGate, AccessStrategy, AppState, ConfigStore, ConnectionConfig,
    ConnectionManager, DataSource, FixtureDataSource, LiveDatabase, SqlGrantStore, StaticGrants,
    DEV_SUPERUSER_ID,
};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("tablegate=info".parse()?))
        .init();

    let store = Arc::new(ConfigStore::new(ConnectionConfig::from_env()));
    let manager = Arc::new(ConnectionManager::new(store));

    let fixtures = std::env::var("TABLEGATE_FIXTURES").map(|v| v == "1").unwrap_or(false);
    let source: Arc<dyn DataSource> = if fixtures {
        Arc::new(FixtureDataSource::seeded())
    } else {
        Arc::new(LiveDatabase::new(manager.clone()))
    };

    let strategy = match std::env::var("TABLEGATE_ACCESS").as_deref() {
        Ok("grants") => AccessStrategy::GrantTable {
            privileged_user: DEV_SUPERUSER_ID,
        },
        _ => AccessStrategy::PrivilegedBypass,
    };
    let gate = if fixtures {
        Arc::new(AccessGate::new(strategy, Arc::new(StaticGrants::new())))
    } else {
        Arc::new(AccessGate::new(strategy, Arc::new(SqlGrantStore::new(manager.clone()))))
    };

    let state = AppState {
        source,
        gate,
        manager,
    };

    let app = Router::new().merge(common_routes()).merge(api_routes(state));

    let listener = TcpListener::bind("0.0.0.0:8000").await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
