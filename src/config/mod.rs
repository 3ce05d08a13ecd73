use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use config::builder::DefaultState;
use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::relay::{JoinPolicy, DEFAULT_ROOM_SEPARATOR};

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorsConfig {
    pub enabled: bool,
    pub allow_any_origin: bool,
    pub allowed_origins: Vec<String>,
    pub max_age: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    /// Fallback filter when `RUST_LOG` is unset.
    pub level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RelayConfig {
    pub room_separator: String,
    pub join_policy: JoinPolicy,
    /// Group ids clients may join. Empty accepts any id. Lists are read from
    /// config files only.
    pub known_groups: Vec<String>,
    pub heartbeat_interval_secs: u64,
    pub client_timeout_secs: u64,
}

impl RelayConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout_secs)
    }

    pub fn accepts_group(&self, group_id: &str) -> bool {
        self.known_groups.is_empty() || self.known_groups.iter().any(|g| g == group_id)
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            room_separator: DEFAULT_ROOM_SEPARATOR.to_string(),
            join_policy: JoinPolicy::default(),
            known_groups: Vec::new(),
            heartbeat_interval_secs: 30,
            client_timeout_secs: 40,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub environment: String,
    pub server: ServerConfig,
    pub cors: CorsConfig,
    pub log: LogConfig,
    pub relay: RelayConfig,
}

fn with_defaults(environment: &str) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("environment", environment)?
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 3000)?
        .set_default("server.workers", num_cpus::get() as i64)?
        .set_default("cors.enabled", true)?
        .set_default("cors.allow_any_origin", true)?
        .set_default("cors.allowed_origins", Vec::<String>::new())?
        .set_default("cors.max_age", 3600)?
        .set_default("log.level", "info")?
        .set_default("relay.room_separator", DEFAULT_ROOM_SEPARATOR)?
        .set_default("relay.join_policy", "announce_always")?
        .set_default("relay.known_groups", Vec::<String>::new())?
        .set_default("relay.heartbeat_interval_secs", 30)?
        .set_default("relay.client_timeout_secs", 40)
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = with_defaults("development")?
            // Add in settings from the config file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))

            // Add in settings from environment variables (with prefix "APP_")
            // E.g., `APP_SERVER__PORT=5001` would set `Settings.server.port`
            .add_source(
                Environment::with_prefix("app")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;

        let settings: Self = s.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Defaults only: no config files, no environment.
    pub fn new_for_test() -> Result<Self, ConfigError> {
        let settings: Self = with_defaults("test")?
            .set_override("server.host", "127.0.0.1")?
            .set_override("server.port", 0)?
            .set_override("server.workers", 1)?
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.relay.room_separator.is_empty() {
            return Err(ConfigError::Message("relay.room_separator must not be empty".into()));
        }
        if self.relay.heartbeat_interval_secs == 0 {
            return Err(ConfigError::Message("relay.heartbeat_interval_secs must be positive".into()));
        }
        if self.relay.client_timeout_secs <= self.relay.heartbeat_interval_secs {
            return Err(ConfigError::Message(
                "relay.client_timeout_secs must exceed relay.heartbeat_interval_secs".into(),
            ));
        }
        Ok(())
    }
}
