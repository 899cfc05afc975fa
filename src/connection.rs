//! Lazily-built PostgreSQL pool driven by the versioned config store.

use crate::config::{ConfigStore, ConnectionConfig};
use crate::error::AppError;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

struct CachedPool {
    version: u64,
    pool: PgPool,
}

/// Owns the current pool and rebuilds it when the config version moves.
/// Handles already cloned out of here stay usable after `invalidate`; only
/// later `acquire` calls see the rebuilt pool.
pub struct ConnectionManager {
    store: Arc<ConfigStore>,
    cached: Mutex<Option<CachedPool>>,
}

impl ConnectionManager {
    pub fn new(store: Arc<ConfigStore>) -> Self {
        ConnectionManager {
            store,
            cached: Mutex::new(None),
        }
    }

    pub fn config_store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    /// Returns a ready-to-use pool. Fails `Unconfigured` when required settings
    /// are missing. The pool is built lazily on the first call after a config
    /// change and reused until the version moves again.
    pub async fn acquire(&self) -> Result<PgPool, AppError> {
        let (config, version) = self.store.get();
        if !config.is_ready() {
            return Err(AppError::Unconfigured);
        }
        let mut cached = self.cached.lock().await;
        if let Some(c) = cached.as_ref() {
            if c.version == version {
                return Ok(c.pool.clone());
            }
        }
        // Stale pool from an older config: drop our handle and rebuild.
        // Handles already cloned out keep the old pool alive until released.
        if let Some(old) = cached.take() {
            tracing::info!(version = old.version, "stale database pool released");
        }
        let pool = build_pool(&config);
        tracing::info!(server = %config.server, database = %config.database, version, "database pool built");
        *cached = Some(CachedPool {
            version,
            pool: pool.clone(),
        });
        Ok(pool)
    }

    #[cfg(test)]
    async fn cached_version(&self) -> Option<u64> {
        self.cached.lock().await.as_ref().map(|c| c.version)
    }

    /// Drops the cached pool; the next `acquire` rebuilds from the current
    /// config. The pool's shared state is never closed here: handles acquired
    /// before invalidation stay usable, and the pool tears itself down once
    /// the last of those handles is released.
    pub async fn invalidate(&self) {
        let mut cached = self.cached.lock().await;
        if let Some(old) = cached.take() {
            tracing::info!(version = old.version, "database pool invalidated");
        }
    }
}

fn build_pool(config: &ConnectionConfig) -> PgPool {
    let username = if config.client_id.is_empty() {
        config.tenant_id.clone()
    } else {
        // Managed-cloud login form: user@tenant.
        format!("{}@{}", config.client_id, config.tenant_id)
    };
    let ssl_mode = match (config.encrypt, config.trust_certificate) {
        (false, _) => PgSslMode::Disable,
        (true, true) => PgSslMode::Require,
        (true, false) => PgSslMode::VerifyFull,
    };
    let mut options = PgConnectOptions::new()
        .host(&config.server)
        .port(config.port)
        .username(&username)
        .password(&config.client_secret)
        .ssl_mode(ssl_mode);
    if !config.database.is_empty() {
        options = options.database(&config.database);
    }
    PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(config.timeout))
        .connect_lazy_with(options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_fails_fast_when_unconfigured() {
        let store = Arc::new(ConfigStore::new(ConnectionConfig::default()));
        let manager = ConnectionManager::new(store);
        assert!(matches!(manager.acquire().await, Err(AppError::Unconfigured)));
    }

    fn ready_config() -> ConnectionConfig {
        ConnectionConfig {
            server: "localhost".into(),
            tenant_id: "t".into(),
            client_secret: "s".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn acquire_tracks_config_version() {
        let store = Arc::new(ConfigStore::new(ready_config()));
        let manager = ConnectionManager::new(store.clone());

        // connect_lazy_with performs no I/O, so this is safe without a server.
        let _pool = manager.acquire().await.unwrap();
        assert_eq!(manager.cached_version().await, Some(1));
        let _pool = manager.acquire().await.unwrap();
        assert_eq!(manager.cached_version().await, Some(1));

        let v = store.replace(ready_config());
        let _pool = manager.acquire().await.unwrap();
        assert_eq!(manager.cached_version().await, Some(v));
    }

    #[tokio::test]
    async fn invalidate_leaves_held_handles_usable() {
        let manager = ConnectionManager::new(Arc::new(ConfigStore::new(ready_config())));
        let held = manager.acquire().await.unwrap();
        manager.invalidate().await;
        // Give any stray background teardown a chance to run before checking.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!held.is_closed());
    }

    #[tokio::test]
    async fn invalidate_drops_cached_pool() {
        let manager = ConnectionManager::new(Arc::new(ConfigStore::new(ready_config())));
        let held = manager.acquire().await.unwrap();
        manager.invalidate().await;
        assert_eq!(manager.cached_version().await, None);
        // The handle acquired before invalidation is still owned by its caller.
        drop(held);
        let _pool = manager.acquire().await.unwrap();
        assert_eq!(manager.cached_version().await, Some(1));
    }
}
