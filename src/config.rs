//! Connection settings and the process-wide versioned store backing them.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::RwLock;

/// Settings needed to reach the database. One process-wide current value,
/// replaced wholesale by `ConfigStore::replace`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub server: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub database: String,
    #[serde(default)]
    pub client_id: String,
    pub tenant_id: String,
    pub client_secret: String,
    #[serde(default = "default_true")]
    pub encrypt: bool,
    #[serde(default)]
    pub trust_certificate: bool,
    /// Connection timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

fn default_port() -> u16 {
    5432
}

fn default_true() -> bool {
    true
}

fn default_timeout() -> u64 {
    30
}

/// Accepts true/1/yes (any case) as true, everything else as false.
pub fn normalize_bool(val: &str) -> bool {
    matches!(val.to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

impl ConnectionConfig {
    /// Build from `TG_*` environment variables. Missing values stay at defaults;
    /// readiness is checked separately so a partial environment is not an error.
    pub fn from_env() -> Self {
        let var = |k: &str| std::env::var(k).unwrap_or_default();
        ConnectionConfig {
            server: var("TG_SERVER"),
            port: var("TG_PORT").parse().unwrap_or_else(|_| default_port()),
            database: var("TG_DATABASE"),
            client_id: var("TG_CLIENT_ID"),
            tenant_id: var("TG_TENANT_ID"),
            client_secret: var("TG_CLIENT_SECRET"),
            encrypt: std::env::var("TG_ENCRYPT")
                .map(|v| normalize_bool(&v))
                .unwrap_or(true),
            trust_certificate: std::env::var("TG_TRUST_CERTIFICATE")
                .map(|v| normalize_bool(&v))
                .unwrap_or(false),
            timeout: var("TG_TIMEOUT").parse().unwrap_or_else(|_| default_timeout()),
        }
    }

    /// All-or-nothing readiness: every required field present, or unconfigured.
    pub fn is_ready(&self) -> bool {
        !self.server.is_empty() && !self.tenant_id.is_empty() && !self.client_secret.is_empty()
    }
}

/// Where the current configuration came from, reported per field by `redacted`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigOrigin {
    Env,
    Override,
}

/// Process-wide settings store. Replacing the value bumps a monotonically
/// increasing version; the ConnectionManager rebuilds its pool on version change.
pub struct ConfigStore {
    inner: RwLock<Versioned>,
}

struct Versioned {
    config: ConnectionConfig,
    version: u64,
    origin: ConfigOrigin,
}

impl ConfigStore {
    pub fn new(config: ConnectionConfig) -> Self {
        ConfigStore {
            inner: RwLock::new(Versioned {
                config,
                version: 1,
                origin: ConfigOrigin::Env,
            }),
        }
    }

    /// Current config and its version.
    pub fn get(&self) -> (ConnectionConfig, u64) {
        let guard = self.inner.read().expect("config store lock poisoned");
        (guard.config.clone(), guard.version)
    }

    pub fn version(&self) -> u64 {
        self.inner.read().expect("config store lock poisoned").version
    }

    /// Replace the config atomically and bump the version. Does not connect.
    pub fn replace(&self, config: ConnectionConfig) -> u64 {
        let mut guard = self.inner.write().expect("config store lock poisoned");
        guard.config = config;
        guard.version += 1;
        guard.origin = ConfigOrigin::Override;
        tracing::info!(version = guard.version, "connection settings replaced");
        guard.version
    }

    /// Current settings with the secret redacted, each field tagged with where
    /// its value came from.
    pub fn redacted(&self) -> serde_json::Value {
        let guard = self.inner.read().expect("config store lock poisoned");
        let origin = match guard.origin {
            ConfigOrigin::Env => "env",
            ConfigOrigin::Override => "override",
        };
        let field = |value: serde_json::Value, set: bool| {
            json!({ "value": value, "source": if set { origin } else { "default" } })
        };
        let c = &guard.config;
        json!({
            "server": field(json!(c.server), !c.server.is_empty()),
            "port": field(json!(c.port), true),
            "database": field(json!(c.database), !c.database.is_empty()),
            "client_id": field(json!(c.client_id), !c.client_id.is_empty()),
            "tenant_id": field(json!(c.tenant_id), !c.tenant_id.is_empty()),
            "client_secret": field(json!(if c.client_secret.is_empty() { "" } else { "***" }), !c.client_secret.is_empty()),
            "encrypt": field(json!(c.encrypt), true),
            "trust_certificate": field(json!(c.trust_certificate), true),
            "timeout": field(json!(c.timeout), true),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready_config() -> ConnectionConfig {
        ConnectionConfig {
            server: "db.example.com".into(),
            tenant_id: "tenant-a".into(),
            client_secret: "s3cret".into(),
            ..Default::default()
        }
    }

    #[test]
    fn readiness_requires_all_fields() {
        assert!(ready_config().is_ready());
        let mut c = ready_config();
        c.server.clear();
        assert!(!c.is_ready());
        let mut c = ready_config();
        c.tenant_id.clear();
        assert!(!c.is_ready());
        let mut c = ready_config();
        c.client_secret.clear();
        assert!(!c.is_ready());
    }

    #[test]
    fn replace_bumps_version() {
        let store = ConfigStore::new(ConnectionConfig::default());
        assert_eq!(store.version(), 1);
        let v = store.replace(ready_config());
        assert_eq!(v, 2);
        assert_eq!(store.get().1, 2);
    }

    #[test]
    fn redacted_hides_secret() {
        let store = ConfigStore::new(ready_config());
        let view = store.redacted();
        assert_eq!(view["client_secret"]["value"], "***");
        assert_eq!(view["server"]["value"], "db.example.com");
        assert_eq!(view["server"]["source"], "env");
        store.replace(ready_config());
        assert_eq!(store.redacted()["server"]["source"], "override");
    }

    #[test]
    fn bool_normalization() {
        assert!(normalize_bool("true"));
        assert!(normalize_bool("YES"));
        assert!(normalize_bool("1"));
        assert!(!normalize_bool("no"));
        assert!(!normalize_bool(""));
    }
}
