//! Typed settings: built-in defaults, then an optional TOML file, then
//! `MEDQA__SECTION__KEY` environment variables.

use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use secrecy::SecretString;
use serde::Deserialize;

const LOCAL_CONFIG_BASENAME: &str = "medqa";
/// Ten years.
const MAX_TOKEN_TTL_HOURS: i64 = 24 * 365 * 10;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub auth: AuthSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub addr: SocketAddr,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    pub ttl_secs: u64,
    pub sweep_interval_secs: u64,
    pub max_entries: usize,
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Capacity of the listing cache, clamped to at least one entry.
    pub fn capacity(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.max_entries).unwrap_or(NonZeroUsize::MIN)
    }
}

#[derive(Debug, Deserialize)]
pub struct AuthSettings {
    pub jwt_secret: SecretString,
    pub token_ttl_hours: i64,
    pub allow_registration: bool,
}

impl AuthSettings {
    pub fn token_lifetime(&self) -> chrono::Duration {
        chrono::Duration::hours(self.token_ttl_hours)
    }
}

impl Settings {
    /// Loads settings; `config_file`, when given, must exist.
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("server.addr", "0.0.0.0:5000")?
            .set_default("database.url", "sqlite:medqa.db")?
            .set_default("database.max_connections", 5)?
            .set_default("cache.ttl_secs", 300)?
            .set_default("cache.sweep_interval_secs", 60)?
            .set_default("cache.max_entries", 1000)?
            .set_default("auth.token_ttl_hours", 24)?
            .set_default("auth.allow_registration", true)?
            .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

        if let Some(path) = config_file {
            builder = builder.add_source(File::from(path).required(true));
        }

        let settings: Settings = builder
            .add_source(Environment::with_prefix("MEDQA").separator("__"))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.database.max_connections == 0 {
            return Err(ConfigError::Message(
                "database.max_connections must be at least 1".to_owned(),
            ));
        }
        if self.cache.sweep_interval_secs == 0 {
            return Err(ConfigError::Message(
                "cache.sweep_interval_secs must be at least 1".to_owned(),
            ));
        }
        if self.auth.token_ttl_hours <= 0 || self.auth.token_ttl_hours > MAX_TOKEN_TTL_HOURS {
            return Err(ConfigError::Message(format!(
                "auth.token_ttl_hours must be between 1 and {MAX_TOKEN_TTL_HOURS}"
            )));
        }
        Ok(())
    }
}
