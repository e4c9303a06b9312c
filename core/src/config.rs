use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::registry::DuplicatePolicy;

pub const DEFAULT_BIND: &str = "0.0.0.0:3000";
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:3000";
const DEFAULT_RUN_TTL_SECS: u64 = 3600;
const DEFAULT_PURGE_INTERVAL_SECS: u64 = 60;

/// Where suspended plan runs are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStoreBackend {
    Memory,
    /// A sqlx SQLite URL, e.g. `sqlite://runs.db?mode=rwc`.
    Sqlite(String),
}

impl FromStr for RunStoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" | "memory" => Ok(RunStoreBackend::Memory),
            url if url.starts_with("sqlite:") => Ok(RunStoreBackend::Sqlite(url.to_string())),
            other => Err(format!("expected 'memory' or a sqlite: URL, got '{}'", other)),
        }
    }
}

/// Engine and gateway settings, read from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub bind: String,
    pub duplicate_policy: DuplicatePolicy,
    pub run_store: RunStoreBackend,
    pub run_ttl: Duration,
    pub purge_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            duplicate_policy: DuplicatePolicy::default(),
            run_store: RunStoreBackend::Memory,
            run_ttl: Duration::from_secs(DEFAULT_RUN_TTL_SECS),
            purge_interval: Duration::from_secs(DEFAULT_PURGE_INTERVAL_SECS),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup. Missing keys fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Ok(Self {
            bind: lookup("TOOLWIRE_BIND").unwrap_or(defaults.bind),
            duplicate_policy: parse_or(&lookup, "TOOLWIRE_DUPLICATE_POLICY", defaults.duplicate_policy)?,
            run_store: parse_or(&lookup, "TOOLWIRE_RUN_STORE", defaults.run_store)?,
            run_ttl: parse_secs(&lookup, "TOOLWIRE_RUN_TTL_SECS", defaults.run_ttl)?,
            purge_interval: parse_secs(&lookup, "TOOLWIRE_PURGE_INTERVAL_SECS", defaults.purge_interval)?,
        })
    }
}

/// Settings for [`crate::client::ToolClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoint: String,
    pub timeout: Option<Duration>,
}

impl ClientConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout: None,
        }
    }

    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let endpoint = std::env::var("TOOLWIRE_ENDPOINT")
            .unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string());
        Self::new(endpoint)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr<Err = String>,
{
    match lookup(key) {
        Some(raw) => raw.parse().map_err(|message| ConfigError { key, message }),
        None => Ok(default),
    }
}

/// A whole number of seconds, at least one.
fn parse_secs<F>(lookup: &F, key: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    match raw.trim().parse::<u64>() {
        Ok(0) => Err(ConfigError {
            key,
            message: "must be at least 1 second".to_string(),
        }),
        Ok(secs) => Ok(Duration::from_secs(secs)),
        Err(e) => Err(ConfigError { key, message: e.to_string() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = EngineConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.bind, DEFAULT_BIND);
        assert_eq!(config.duplicate_policy, DuplicatePolicy::Strict);
        assert_eq!(config.run_store, RunStoreBackend::Memory);
        assert_eq!(config.run_ttl, Duration::from_secs(3600));
    }

    #[test]
    fn reads_overrides() {
        let config = EngineConfig::from_lookup(lookup_from(&[
            ("TOOLWIRE_DUPLICATE_POLICY", "overwrite"),
            ("TOOLWIRE_RUN_STORE", "sqlite://runs.db?mode=rwc"),
            ("TOOLWIRE_RUN_TTL_SECS", "30"),
        ]))
        .unwrap();
        assert_eq!(config.duplicate_policy, DuplicatePolicy::Overwrite);
        assert_eq!(
            config.run_store,
            RunStoreBackend::Sqlite("sqlite://runs.db?mode=rwc".to_string())
        );
        assert_eq!(config.run_ttl, Duration::from_secs(30));
    }

    #[test]
    fn rejects_garbage() {
        let err = EngineConfig::from_lookup(lookup_from(&[("TOOLWIRE_DUPLICATE_POLICY", "maybe")]))
            .unwrap_err();
        assert_eq!(err.key, "TOOLWIRE_DUPLICATE_POLICY");

        let err = EngineConfig::from_lookup(lookup_from(&[("TOOLWIRE_RUN_TTL_SECS", "soon")]))
            .unwrap_err();
        assert_eq!(err.key, "TOOLWIRE_RUN_TTL_SECS");
    }

    #[test]
    fn rejects_zero_durations() {
        let err = EngineConfig::from_lookup(lookup_from(&[("TOOLWIRE_PURGE_INTERVAL_SECS", "0")]))
            .unwrap_err();
        assert_eq!(err.key, "TOOLWIRE_PURGE_INTERVAL_SECS");

        let err = EngineConfig::from_lookup(lookup_from(&[("TOOLWIRE_RUN_TTL_SECS", " 0 ")]))
            .unwrap_err();
        assert_eq!(err.key, "TOOLWIRE_RUN_TTL_SECS");

        let config = EngineConfig::from_lookup(lookup_from(&[("TOOLWIRE_PURGE_INTERVAL_SECS", "1")])).unwrap();
        assert_eq!(config.purge_interval, Duration::from_secs(1));
    }
}
