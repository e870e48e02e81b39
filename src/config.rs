use std::env;
use std::path::PathBuf;
use std::time::Duration;
use crate::engine::RetryPolicy;

pub const ENV_DATA_DIR: &str = "TENANT_STORE_DATA_DIR";
pub const ENV_WRITE_ATTEMPTS: &str = "TENANT_STORE_WRITE_ATTEMPTS";
pub const ENV_WRITE_BACKOFF_MS: &str = "TENANT_STORE_WRITE_BACKOFF_MS";

/// Where the console keeps its data and how hard it tries to write it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
    pub write_attempts: u32,
    pub write_backoff_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            data_dir: PathBuf::from("data"),
            write_attempts: retry.attempts,
            write_backoff_ms: retry.backoff.as_millis() as u64,
        }
    }
}

impl StoreConfig {
    /// Reads `TENANT_STORE_*` variables, falling back to defaults for unset or unparsable values.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        let defaults = Self::default();
        let data_dir = lookup(ENV_DATA_DIR)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);
        let write_attempts = parse_or(lookup(ENV_WRITE_ATTEMPTS), ENV_WRITE_ATTEMPTS, defaults.write_attempts);
        let write_backoff_ms = parse_or(lookup(ENV_WRITE_BACKOFF_MS), ENV_WRITE_BACKOFF_MS, defaults.write_backoff_ms);
        Self { data_dir, write_attempts, write_backoff_ms }
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.write_attempts.max(1),
            backoff: Duration::from_millis(self.write_backoff_ms),
        }
    }
}

fn parse_or<T: std::str::FromStr>(raw: Option<String>, key: &str, default: T) -> T {
    match raw {
        Some(v) => v.trim().parse().unwrap_or_else(|_| {
            log::warn!("Ignoring invalid {}={:?}", key, v);
            default
        }),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = StoreConfig::from_lookup(lookup(&[]));
        assert_eq!(config, StoreConfig::default());
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert_eq!(config.retry_policy(), RetryPolicy::default());
    }

    #[test]
    fn test_env_overrides() {
        let config = StoreConfig::from_lookup(lookup(&[
            (ENV_DATA_DIR, "/var/lib/console"),
            (ENV_WRITE_ATTEMPTS, "5"),
            (ENV_WRITE_BACKOFF_MS, "10"),
        ]));
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/console"));
        assert_eq!(config.retry_policy().attempts, 5);
        assert_eq!(config.retry_policy().backoff, Duration::from_millis(10));
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = StoreConfig::from_lookup(lookup(&[(ENV_WRITE_ATTEMPTS, "many"), (ENV_DATA_DIR, "")]));
        assert_eq!(config.write_attempts, 3);
        assert_eq!(config.data_dir, PathBuf::from("data"));
    }
}
