use std::net::SocketAddr;
use std::time::Duration;

use permitdesk_core::Principal;
use permitdesk_db_postgres::PostgresConfig;
use serde::{Deserialize, Serialize};

/// Default configuration file, looked up in the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "permitdesk.toml";

/// Prefix of environment overrides, e.g. `PERMITDESK__SERVER__PORT=9090`.
pub const ENV_PREFIX: &str = "PERMITDESK";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config build error: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub auth: AuthSettings,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.server.port == 0 {
            return invalid("server.port must be > 0".into());
        }
        if self.auth.jwt_secret.trim().is_empty() {
            return invalid("auth.jwt_secret must be set".into());
        }
        if self.auth.token_ttl_secs == 0 {
            return invalid("auth.token_ttl_secs must be > 0".into());
        }
        if self.cache.principal_ttl_secs == 0 || self.cache.query_ttl_secs == 0 {
            return invalid("cache TTLs must be > 0".into());
        }
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return invalid(format!("logging.level must be one of {valid_levels:?}"));
        }
        if self.storage.backend == StorageBackend::Postgres {
            self.storage
                .postgres
                .validate()
                .or_else(|e| invalid(format!("storage.postgres: {e}")))?;
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        SocketAddr::from((host, self.server.port))
    }

    /// Copy safe to print: secrets are masked.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.auth.jwt_secret.is_empty() {
            copy.auth.jwt_secret = "****".into();
        }
        if copy.storage.postgres.password.is_some() {
            copy.storage.postgres.password = Some("****".into());
        }
        if copy.storage.postgres.url.is_some() {
            copy.storage.postgres.url = Some(copy.storage.postgres.display_url());
        }
        copy
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}
fn default_body_limit() -> usize {
    64 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Postgres,
    /// In-process tables, seeded from `storage.memory.users`.
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Cooldown before a failed pool creation is attempted again.
    #[serde(default = "default_pool_retry_secs")]
    pub pool_retry_secs: u64,
    #[serde(default)]
    pub postgres: PostgresConfig,
    #[serde(default)]
    pub memory: MemoryStorageConfig,
}

fn default_pool_retry_secs() -> u64 {
    30
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            pool_retry_secs: default_pool_retry_secs(),
            postgres: PostgresConfig::default(),
            memory: MemoryStorageConfig::default(),
        }
    }
}

impl StorageConfig {
    pub fn pool_retry(&self) -> Duration {
        Duration::from_secs(self.pool_retry_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MemoryStorageConfig {
    #[serde(default)]
    pub users: Vec<Principal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSettings {
    /// HS256 shared secret. Required.
    #[serde(default)]
    pub jwt_secret: String,
    /// Lifetime of tokens issued with `--issue-token`.
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: u64,
    /// Clock skew tolerated on `exp`.
    #[serde(default)]
    pub leeway_secs: u64,
}

fn default_token_ttl_secs() -> u64 {
    30 * 60
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_ttl_secs: default_token_ttl_secs(),
            leeway_secs: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_principal_ttl_secs")]
    pub principal_ttl_secs: u64,
    #[serde(default = "default_query_ttl_secs")]
    pub query_ttl_secs: u64,
}

fn default_principal_ttl_secs() -> u64 {
    300
}
fn default_query_ttl_secs() -> u64 {
    60
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            principal_ttl_secs: default_principal_ttl_secs(),
            query_ttl_secs: default_query_ttl_secs(),
        }
    }
}

impl CacheConfig {
    pub fn principal_ttl(&self) -> Duration {
        Duration::from_secs(self.principal_ttl_secs)
    }

    pub fn query_ttl(&self) -> Duration {
        Duration::from_secs(self.query_ttl_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub mod loader {
    use std::path::Path;

    use config::{Config, Environment, File};

    use super::{AppConfig, ConfigError, ENV_PREFIX};

    /// Environment source for `PERMITDESK__SECTION__KEY` overrides.
    pub fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .try_parsing(true)
            .separator("__")
    }

    /// Loads the file at `path` (skipped when missing), applies environment
    /// overrides and validates the result.
    pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
        load_config_with(path, environment())
    }

    pub fn load_config_with(path: &Path, env: Environment) -> Result<AppConfig, ConfigError> {
        let mut builder = Config::builder();
        if path.exists() {
            builder = builder.add_source(File::from(path));
        } else {
            tracing::warn!(path = %path.display(), "Config file not found, using defaults");
        }
        let merged: AppConfig = builder.add_source(env).build()?.try_deserialize()?;
        merged.validate()?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.auth.jwt_secret = "s3cret".into();
        cfg
    }

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.storage.backend, StorageBackend::Postgres);
        assert_eq!(cfg.storage.pool_retry(), Duration::from_secs(30));
        assert_eq!(cfg.storage.postgres.pool_size, 10);
        assert_eq!(cfg.cache.principal_ttl(), Duration::from_secs(300));
        assert_eq!(cfg.cache.query_ttl(), Duration::from_secs(60));
        assert_eq!(cfg.auth.token_ttl_secs, 1800);
        assert_eq!(cfg.addr().to_string(), "0.0.0.0:8080");
    }

    #[test]
    fn test_validate() {
        assert!(valid().validate().is_ok());
        assert!(AppConfig::default().validate().is_err());

        let mut cfg = valid();
        cfg.cache.query_ttl_secs = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = valid();
        cfg.logging.level = "loud".into();
        assert!(cfg.validate().is_err());

        let mut cfg = valid();
        cfg.storage.postgres.pool_size = 0;
        assert!(cfg.validate().is_err());
        cfg.storage.backend = StorageBackend::Memory;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_redacted_masks_secrets() {
        let mut cfg = valid();
        cfg.storage.postgres.url = Some("postgres://app:pw@db:5432/permits".into());

        let redacted = cfg.redacted();
        assert_eq!(redacted.auth.jwt_secret, "****");
        assert_eq!(
            redacted.storage.postgres.url.as_deref(),
            Some("postgres://app:****@db:5432/permits")
        );
        assert_eq!(cfg.auth.jwt_secret, "s3cret");
    }
}
