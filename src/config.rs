//! Application configuration module
//! Handles environment variable loading, configuration validation, and application settings

use crate::payments::PaystackConfig;
use std::env;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub auth: AuthConfig,
    pub paystack: PaystackConfig,
    pub webhooks: WebhookConfig,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Public base URL of this service, used for the default payment callback
    pub app_url: String,
    pub frontend_url: String,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout: u64,   // seconds
    pub idle_timeout: Option<u64>, // seconds
    /// Apply `migrations/` at startup
    pub run_migrations: bool,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log format options
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Plain,
}

/// Bearer token verification
#[derive(Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"<redacted>")
            .finish()
    }
}

/// Failed webhook re-dispatch
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub retry_enabled: bool,
    pub retry_interval_secs: u64,
    pub max_retries: i32,
    pub batch_size: i64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            retry_enabled: true,
            retry_interval_secs: 300,
            max_retries: 5,
            batch_size: 50,
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: &str) -> Result<T, ConfigError> {
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|_| ConfigError::InvalidValue(name.to_string()))
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        dotenv::dotenv().ok();

        Ok(AppConfig {
            server: ServerConfig::from_env()?,
            database: DatabaseConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
            auth: AuthConfig::from_env()?,
            paystack: PaystackConfig::from_env()
                .map_err(|_| ConfigError::MissingVariable("PAYSTACK_SECRET_KEY".to_string()))?,
            webhooks: WebhookConfig::from_env()?,
        })
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.database.validate()?;
        self.logging.validate()?;
        self.auth.validate()?;
        self.webhooks.validate()?;

        if self.paystack.secret_key.trim().is_empty() {
            return Err(ConfigError::InvalidValue("PAYSTACK_SECRET_KEY".to_string()));
        }
        if self.paystack.webhook_secret.is_none() {
            tracing::warn!("PAYSTACK_WEBHOOK_SECRET not set, webhooks are verified with the secret key");
        }

        Ok(())
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let port: u16 = parse_var("SERVER_PORT", "8000")?;
        Ok(ServerConfig {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port,
            app_url: env::var("APP_URL").unwrap_or_else(|_| format!("http://localhost:{}", port)),
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue(
                "SERVER_PORT cannot be 0".to_string(),
            ));
        }

        if self.host.is_empty() {
            return Err(ConfigError::InvalidValue(
                "SERVER_HOST cannot be empty".to_string(),
            ));
        }

        if !self.app_url.starts_with("http://") && !self.app_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "APP_URL must be a valid URL".to_string(),
            ));
        }

        Ok(())
    }

    pub fn default_callback_url(&self) -> String {
        format!("{}/payment/callback", self.app_url.trim_end_matches('/'))
    }
}

/// `DATABASE_URL` from its parts, for deployments that set `DB_*` separately.
pub fn database_url_from_parts(
    host: &str,
    port: u16,
    name: &str,
    user: &str,
    password: &str,
) -> String {
    if password.is_empty() {
        format!("postgres://{}@{}:{}/{}", user, host, port, name)
    } else {
        format!("postgres://{}:{}@{}:{}/{}", user, password, host, port, name)
    }
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let url = match env::var("DATABASE_URL") {
            Ok(url) => url,
            Err(_) => {
                let host = env::var("DB_HOST")
                    .map_err(|_| ConfigError::MissingVariable("DATABASE_URL or DB_HOST".to_string()))?;
                database_url_from_parts(
                    &host,
                    parse_var("DB_PORT", "5432")?,
                    &env::var("DB_NAME").unwrap_or_else(|_| "voguevault".to_string()),
                    &env::var("DB_USER").unwrap_or_else(|_| "postgres".to_string()),
                    &env::var("DB_PASSWORD").unwrap_or_default(),
                )
            }
        };

        Ok(DatabaseConfig {
            url,
            max_connections: parse_var("DB_MAX_CONNECTIONS", "20")?,
            min_connections: parse_var("DB_MIN_CONNECTIONS", "5")?,
            connection_timeout: parse_var("DB_CONNECTION_TIMEOUT", "30")?,
            idle_timeout: env::var("DB_IDLE_TIMEOUT")
                .ok()
                .and_then(|val| val.parse().ok()),
            run_migrations: parse_var("DB_RUN_MIGRATIONS", "true")?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::InvalidValue("DATABASE_URL".to_string()));
        }

        if self.max_connections == 0 {
            return Err(ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string()));
        }

        if self.min_connections > self.max_connections {
            return Err(ConfigError::InvalidValue(
                "DB_MIN_CONNECTIONS must be <= DB_MAX_CONNECTIONS".to_string(),
            ));
        }

        Ok(())
    }
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "plain".to_string())
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Plain,
            },
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];
        if !valid_levels.contains(&self.level.to_uppercase().as_str()) {
            return Err(ConfigError::InvalidValue("LOG_LEVEL".to_string()));
        }

        Ok(())
    }
}

impl AuthConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(AuthConfig {
            jwt_secret: env::var("JWT_SECRET")
                .map_err(|_| ConfigError::MissingVariable("JWT_SECRET".to_string()))?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_secret.len() < 16 {
            return Err(ConfigError::ValidationFailed(
                "JWT_SECRET must be at least 16 characters".to_string(),
            ));
        }
        Ok(())
    }
}

impl WebhookConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(WebhookConfig {
            retry_enabled: parse_var("WEBHOOK_RETRY_ENABLED", "true")?,
            retry_interval_secs: parse_var("WEBHOOK_RETRY_INTERVAL_SECS", "300")?,
            max_retries: parse_var("WEBHOOK_MAX_RETRIES", "5")?,
            batch_size: parse_var("WEBHOOK_RETRY_BATCH_SIZE", "50")?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry_interval_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "WEBHOOK_RETRY_INTERVAL_SECS".to_string(),
            ));
        }
        if self.max_retries < 0 || self.batch_size <= 0 {
            return Err(ConfigError::InvalidValue(
                "WEBHOOK_MAX_RETRIES / WEBHOOK_RETRY_BATCH_SIZE".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    #[error("Invalid value for configuration: {0}")]
    InvalidValue(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

impl From<ConfigError> for crate::error::AppError {
    fn from(err: ConfigError) -> Self {
        use crate::error::{AppError, AppErrorKind, InfrastructureError};

        AppError::new(AppErrorKind::Infrastructure(
            InfrastructureError::Configuration {
                message: err.to_string(),
            },
        ))
    }
}
