//! Runtime configuration.
//!
//! Settings come from `config/config.toml` (optional) overlaid with `SAFELEDGER__*`
//! environment variables, e.g. `SAFELEDGER__DATABASE__URL` or
//! `SAFELEDGER__LEDGER__UPCOMING_WINDOW_DAYS`.

pub use crate::pool::config::DatabaseConfig;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";
const ENV_PREFIX: &str = "SAFELEDGER";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub ledger: LedgerSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerSettings {
    /// Default look-ahead for upcoming obligations.
    #[serde(default = "default_upcoming_window_days")]
    pub upcoming_window_days: u32,
    /// How long a writer waits for a row lock before giving up.
    #[serde(default = "default_lock_timeout_seconds")]
    pub lock_timeout_seconds: u64,
}

fn default_upcoming_window_days() -> u32 {
    30
}

fn default_lock_timeout_seconds() -> u64 {
    5
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            upcoming_window_days: default_upcoming_window_days(),
            lock_timeout_seconds: default_lock_timeout_seconds(),
        }
    }
}

impl LedgerSettings {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_seconds)
    }

    pub fn upcoming_window(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.upcoming_window_days))
    }
}

impl LedgerConfig {
    /// Load from [`DEFAULT_CONFIG_PATH`] and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load from `path` and the environment. A missing file is not an error; an
    /// unreadable one is logged and skipped.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let settings = match Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(env_source())
            .build()
        {
            Ok(settings) => settings,
            Err(err) if path.exists() => {
                log::warn!(
                    "failed to read {}, using environment only: {err}",
                    path.display()
                );
                Config::builder().add_source(env_source()).build()?
            }
            Err(err) => return Err(err),
        };
        settings.try_deserialize()
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .try_parsing(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_when_file_missing() {
        let config = LedgerConfig::load_from("does/not/exist.toml").unwrap();
        assert_eq!(config.ledger.upcoming_window_days, 30);
        assert_eq!(config.ledger.lock_timeout(), Duration::from_secs(5));
        assert!(config.database.max_connections > 0);
    }

    #[test]
    fn test_file_values_override_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[database]\nurl = \"postgres://ledger:secret@db:5432/books\"\nmax_connections = 4\n\n\
             [ledger]\nupcoming_window_days = 14"
        )
        .unwrap();

        let config = LedgerConfig::load_from(file.path()).unwrap();
        assert_eq!(config.database.url, "postgres://ledger:secret@db:5432/books");
        assert_eq!(config.database.max_connections, 4);
        assert_eq!(config.database.pool_timeout_seconds, 30);
        assert_eq!(config.ledger.upcoming_window_days, 14);
        assert_eq!(config.ledger.upcoming_window(), chrono::Duration::days(14));
        assert_eq!(config.ledger.lock_timeout_seconds, 5);
    }
}
