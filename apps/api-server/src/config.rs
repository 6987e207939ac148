//! Centralized configuration for api-server.
//!
//! All environment variables are loaded and validated at startup to fail fast
//! on misconfiguration rather than at request time.

use axum::http::HeaderValue;
use std::env;
use std::fmt;
use std::path::PathBuf;

/// Storage backend provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageProvider {
    /// In-memory storage (data lost on restart)
    Memory,
    /// SQLite with hand-managed statements
    Sqlite,
    /// SQLite through the query template helper
    SqliteTemplate,
}

impl StorageProvider {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Some(Self::Memory),
            "sqlite" => Some(Self::Sqlite),
            "sqlite-template" | "sqlite_template" => Some(Self::SqliteTemplate),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Sqlite => "sqlite",
            Self::SqliteTemplate => "sqlite-template",
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn from_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub struct ConfigError {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Configuration error for {}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Server configuration loaded from environment variables.
///
/// All fields are validated at construction time.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port (default: 8080)
    pub port: u16,
    /// CORS allow origin
    pub cors_allow_origin: HeaderValue,
    /// Storage provider (default: sqlite-template)
    pub storage_provider: StorageProvider,
    /// SQLite database path for the SQL providers
    pub db_path: PathBuf,
    /// Log format
    pub log_format: LogFormat,
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// Fails fast on invalid configuration.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`Config::from_env`] but reading values through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Port
        let port = match lookup("PORT") {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError {
                field: "PORT",
                message: format!("Invalid port '{}'", raw),
            })?,
            None => 8080,
        };

        // CORS allow origin
        let cors_origin_str = lookup("CORS_ALLOW_ORIGIN").unwrap_or_else(|| "*".into());
        let cors_allow_origin = if cors_origin_str == "*" {
            HeaderValue::from_static("*")
        } else {
            HeaderValue::from_str(&cors_origin_str).map_err(|e| ConfigError {
                field: "CORS_ALLOW_ORIGIN",
                message: format!("Invalid header value '{}': {}", cors_origin_str, e),
            })?
        };

        // Storage provider
        let storage_str = lookup("STORAGE_PROVIDER").unwrap_or_else(|| "sqlite-template".into());
        let storage_provider = StorageProvider::parse(&storage_str).ok_or_else(|| ConfigError {
            field: "STORAGE_PROVIDER",
            message: format!(
                "Unknown provider '{}' (expected memory, sqlite or sqlite-template)",
                storage_str
            ),
        })?;
        if !cfg!(feature = "sqlite") && storage_provider != StorageProvider::Memory {
            return Err(ConfigError {
                field: "STORAGE_PROVIDER",
                message: format!(
                    "'{}' requires the `sqlite` feature",
                    storage_provider.as_str()
                ),
            });
        }

        // DB path (for sqlite)
        let db_path = lookup("DB_PATH")
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data/members.db"));

        // Log format
        let log_format =
            LogFormat::from_str(&lookup("LOG_FORMAT").unwrap_or_else(|| "pretty".into()));

        Ok(Self {
            port,
            cors_allow_origin,
            storage_provider,
            db_path,
            log_format,
        })
    }

    /// Log a one-line summary of the effective configuration.
    pub fn log_summary(&self) {
        tracing::info!(
            port = self.port,
            storage = self.storage_provider.as_str(),
            db_path = %self.db_path.display(),
            "configuration loaded"
        );
        if self.storage_provider == StorageProvider::Memory {
            tracing::warn!("STORAGE_PROVIDER=memory: members are lost when the process exits");
        }
    }
}
