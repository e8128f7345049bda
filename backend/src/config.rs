use std::path::PathBuf;
use std::str::FromStr;

use chrono_tz::Tz;
use thiserror::Error;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
const DEFAULT_STATIC_DIR: &str = "frontend/dist";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Redis,
    Memory,
}

impl FromStr for StoreKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(StoreKind::Redis),
            "memory" | "mem" => Ok(StoreKind::Memory),
            other => Err(ConfigError::Invalid {
                key: "TASKLIST_STORE",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: `{value}`")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub store: StoreKind,
    pub redis_url: String,
    pub static_dir: PathBuf,
    /// Zone used for tab boundaries when a client does not send its offset.
    pub timezone: Tz,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let store = match get("TASKLIST_STORE") {
            Some(raw) => raw.parse()?,
            None => StoreKind::Redis,
        };

        let timezone = match get("TASKLIST_TIMEZONE") {
            Some(raw) => raw.trim().parse::<Tz>().map_err(|_| ConfigError::Invalid {
                key: "TASKLIST_TIMEZONE",
                value: raw,
            })?,
            None => chrono_tz::UTC,
        };

        Ok(Self {
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            store,
            redis_url: get("REDIS_URL").unwrap_or_else(|| DEFAULT_REDIS_URL.to_string()),
            static_dir: get("STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STATIC_DIR)),
            timezone,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_match_a_local_redis_setup() {
        let config = config(&[]).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:3000");
        assert_eq!(config.store, StoreKind::Redis);
        assert_eq!(config.redis_url, "redis://127.0.0.1:6379");
        assert_eq!(config.static_dir, PathBuf::from("frontend/dist"));
        assert_eq!(config.timezone, chrono_tz::UTC);
    }

    #[test]
    fn reads_overrides() {
        let config = config(&[
            ("TASKLIST_STORE", "memory"),
            ("TASKLIST_TIMEZONE", "Europe/Istanbul"),
            ("BIND_ADDR", "127.0.0.1:8080"),
        ])
        .unwrap();
        assert_eq!(config.store, StoreKind::Memory);
        assert_eq!(config.timezone, chrono_tz::Europe::Istanbul);
        assert_eq!(config.bind_addr, "127.0.0.1:8080");
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let config = config(&[("REDIS_URL", "  ")]).unwrap();
        assert_eq!(config.redis_url, "redis://127.0.0.1:6379");
    }

    #[test]
    fn rejects_unknown_values() {
        assert!(config(&[("TASKLIST_STORE", "postgres")]).is_err());
        assert!(config(&[("TASKLIST_TIMEZONE", "Mars/Olympus")]).is_err());
    }
}
