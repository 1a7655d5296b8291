//! Configuration management
//!
//! Loaded once at startup into an immutable [`Config`]; components receive the
//! sections they need by reference and never read the environment while
//! serving requests.

use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf, str::FromStr};

use crate::auth::WindowGranularity;
use crate::middleware::rate_limit::RateLimitConfig;

// ============================================================================
// Server Configuration Constants
// ============================================================================

/// Default server host binding.
pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";

/// Default server port.
pub const DEFAULT_SERVER_PORT: u16 = 8080;

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/skillgate";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Default minimum database connections in the pool.
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 2;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default database idle timeout in seconds (10 minutes).
pub const DEFAULT_DATABASE_IDLE_TIMEOUT_SECS: u64 = 600;

/// Default CORS allowed origin for local development.
pub const DEFAULT_CORS_ALLOWED_ORIGIN: &str = "http://localhost:3000";

/// Default identity class assigned to authenticated callers.
pub const DEFAULT_TRUSTED_CALLER: &str = "trusted-caller";

/// Minimum accepted length of the shared secret prefix.
pub const MIN_SHARED_SECRET_LENGTH: usize = 16;

/// Hard ceiling on rows returned by one read.
pub const DEFAULT_ROW_CEILING: u32 = 1000;

/// Row cap for reads that do not name an explicit column subset.
pub const DEFAULT_FULL_WIDTH_ROW_LIMIT: u32 = 200;

/// Deadline applied to every backing-store call, in milliseconds.
pub const DEFAULT_BACKEND_DEADLINE_MS: u64 = 5_000;

/// Maximum number of entities in one batch synchronization.
pub const DEFAULT_MAX_BATCH_ENTITIES: usize = 100;

/// Default location of the allowlist file.
pub const DEFAULT_ALLOWLIST_PATH: &str = "config/allowlist.toml";

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub cors: CorsConfig,
    pub auth: AuthConfig,
    pub rate_limit: RateLimitConfig,
    pub query: QueryConfig,
    pub sync: SyncConfig,
    pub backend: BackendKind,
    pub allowlist_path: PathBuf,
    /// JSON fixture loaded into the in-process backend at startup
    pub memory_seed_path: Option<PathBuf>,
}

/// Server-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
}

/// Window-credential configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Shared secret prefix; credentials are `prefix ++ windowLabel`
    #[serde(skip_serializing)]
    pub shared_secret: String,
    pub granularity: WindowGranularity,
    /// Identity class reported for every authenticated caller
    pub trusted_caller: String,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("shared_secret", &"<redacted>")
            .field("granularity", &self.granularity)
            .field("trusted_caller", &self.trusted_caller)
            .finish()
    }
}

/// Read-path limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    pub row_ceiling: u32,
    pub full_width_row_limit: u32,
    pub deadline_ms: u64,
}

/// Synchronization limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub max_batch_entities: usize,
    pub deadline_ms: u64,
}

/// Which backing store implementation to run against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Postgres,
    /// In-process store, for development and tests
    Memory,
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            other => Err(anyhow::anyhow!("Unknown backend: {}", other)),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let granularity = match std::env::var("SKILLGATE_TOKEN_WINDOW") {
            Ok(raw) => raw.parse()?,
            Err(_) => WindowGranularity::default(),
        };
        let backend = match std::env::var("SKILLGATE_BACKEND") {
            Ok(raw) => raw.parse()?,
            Err(_) => BackendKind::default(),
        };

        let config = Config {
            server: ServerConfig {
                host: std::env::var("SKILLGATE_HOST")
                    .unwrap_or_else(|_| DEFAULT_SERVER_HOST.to_string()),
                port: env_or("SKILLGATE_PORT", DEFAULT_SERVER_PORT),
                shutdown_timeout_secs: env_or(
                    "SKILLGATE_SHUTDOWN_TIMEOUT",
                    DEFAULT_SHUTDOWN_TIMEOUT_SECS,
                ),
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
                max_connections: env_or(
                    "DATABASE_MAX_CONNECTIONS",
                    DEFAULT_DATABASE_MAX_CONNECTIONS,
                ),
                min_connections: env_or(
                    "DATABASE_MIN_CONNECTIONS",
                    DEFAULT_DATABASE_MIN_CONNECTIONS,
                ),
                connect_timeout_secs: env_or(
                    "DATABASE_CONNECT_TIMEOUT",
                    DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                ),
                idle_timeout_secs: env_or(
                    "DATABASE_IDLE_TIMEOUT",
                    DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
                ),
            },
            cors: CorsConfig {
                allowed_origins: std::env::var("CORS_ALLOWED_ORIGINS")
                    .unwrap_or_else(|_| DEFAULT_CORS_ALLOWED_ORIGIN.to_string())
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
                allow_credentials: env_or("CORS_ALLOW_CREDENTIALS", true),
            },
            auth: AuthConfig {
                shared_secret: std::env::var("SKILLGATE_SHARED_SECRET").unwrap_or_default(),
                granularity,
                trusted_caller: std::env::var("SKILLGATE_TRUSTED_CALLER")
                    .unwrap_or_else(|_| DEFAULT_TRUSTED_CALLER.to_string()),
            },
            rate_limit: RateLimitConfig::from_env(),
            query: QueryConfig {
                row_ceiling: env_or("SKILLGATE_ROW_CEILING", DEFAULT_ROW_CEILING),
                full_width_row_limit: env_or(
                    "SKILLGATE_FULL_WIDTH_ROW_LIMIT",
                    DEFAULT_FULL_WIDTH_ROW_LIMIT,
                ),
                deadline_ms: env_or("SKILLGATE_QUERY_DEADLINE_MS", DEFAULT_BACKEND_DEADLINE_MS),
            },
            sync: SyncConfig {
                max_batch_entities: env_or(
                    "SKILLGATE_MAX_BATCH_ENTITIES",
                    DEFAULT_MAX_BATCH_ENTITIES,
                ),
                deadline_ms: env_or("SKILLGATE_SYNC_DEADLINE_MS", DEFAULT_BACKEND_DEADLINE_MS),
            },
            backend,
            allowlist_path: std::env::var("SKILLGATE_ALLOWLIST_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_ALLOWLIST_PATH)),
            memory_seed_path: std::env::var("SKILLGATE_MEMORY_SEED").ok().map(PathBuf::from),
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port must be greater than 0");
        }

        if self.backend == BackendKind::Postgres && self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }

        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "Database min_connections ({}) cannot be greater than max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }

        if self.auth.shared_secret.len() < MIN_SHARED_SECRET_LENGTH {
            anyhow::bail!(
                "SKILLGATE_SHARED_SECRET must be at least {} characters",
                MIN_SHARED_SECRET_LENGTH
            );
        }

        if self.auth.trusted_caller.trim().is_empty() {
            anyhow::bail!("Trusted caller name cannot be empty");
        }

        if self.query.row_ceiling == 0 {
            anyhow::bail!("Row ceiling must be greater than 0");
        }

        if self.query.full_width_row_limit > self.query.row_ceiling {
            anyhow::bail!(
                "Full-width row limit ({}) cannot exceed the row ceiling ({})",
                self.query.full_width_row_limit,
                self.query.row_ceiling
            );
        }

        if self.sync.max_batch_entities == 0 {
            anyhow::bail!("Batch size limit must be greater than 0");
        }

        if self.rate_limit.window_secs == 0 {
            anyhow::bail!("Rate limit window must be at least one second");
        }

        if self.cors.allowed_origins.is_empty() {
            tracing::warn!("No CORS origins configured - all origins will be allowed");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: DEFAULT_SERVER_HOST.to_string(),
                port: DEFAULT_SERVER_PORT,
                shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            },
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                min_connections: DEFAULT_DATABASE_MIN_CONNECTIONS,
                connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                idle_timeout_secs: DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
            },
            cors: CorsConfig {
                allowed_origins: vec![DEFAULT_CORS_ALLOWED_ORIGIN.to_string()],
                allow_credentials: true,
            },
            auth: AuthConfig {
                shared_secret: String::new(),
                granularity: WindowGranularity::default(),
                trusted_caller: DEFAULT_TRUSTED_CALLER.to_string(),
            },
            rate_limit: RateLimitConfig::default(),
            query: QueryConfig {
                row_ceiling: DEFAULT_ROW_CEILING,
                full_width_row_limit: DEFAULT_FULL_WIDTH_ROW_LIMIT,
                deadline_ms: DEFAULT_BACKEND_DEADLINE_MS,
            },
            sync: SyncConfig {
                max_batch_entities: DEFAULT_MAX_BATCH_ENTITIES,
                deadline_ms: DEFAULT_BACKEND_DEADLINE_MS,
            },
            backend: BackendKind::default(),
            allowlist_path: PathBuf::from(DEFAULT_ALLOWLIST_PATH),
            memory_seed_path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.auth.shared_secret = "0123456789abcdef-secret".to_string();
        config
    }

    #[test]
    fn test_default_requires_secret() {
        assert!(Config::default().validate().is_err());
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_full_width_limit_cannot_exceed_ceiling() {
        let mut config = valid_config();
        config.query.full_width_row_limit = config.query.row_ceiling + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_auth_debug_redacts_secret() {
        let config = valid_config();
        let rendered = format!("{:?}", config.auth);
        assert!(!rendered.contains("0123456789abcdef"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    #[serial]
    fn test_load_from_env() {
        std::env::set_var("SKILLGATE_SHARED_SECRET", "env-secret-prefix-0001");
        std::env::set_var("SKILLGATE_TOKEN_WINDOW", "minute");
        std::env::set_var("SKILLGATE_BACKEND", "memory");
        std::env::set_var("SKILLGATE_ROW_CEILING", "50");
        std::env::set_var("SKILLGATE_FULL_WIDTH_ROW_LIMIT", "10");

        let config = Config::load().unwrap();
        assert_eq!(config.auth.granularity, WindowGranularity::Minute);
        assert_eq!(config.backend, BackendKind::Memory);
        assert_eq!(config.query.row_ceiling, 50);
        assert_eq!(config.query.full_width_row_limit, 10);

        for key in [
            "SKILLGATE_SHARED_SECRET",
            "SKILLGATE_TOKEN_WINDOW",
            "SKILLGATE_BACKEND",
            "SKILLGATE_ROW_CEILING",
            "SKILLGATE_FULL_WIDTH_ROW_LIMIT",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_load_rejects_unknown_backend() {
        std::env::set_var("SKILLGATE_SHARED_SECRET", "env-secret-prefix-0001");
        std::env::set_var("SKILLGATE_BACKEND", "oracle");

        assert!(Config::load().is_err());

        std::env::remove_var("SKILLGATE_SHARED_SECRET");
        std::env::remove_var("SKILLGATE_BACKEND");
    }
}
