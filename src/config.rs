use anyhow::{Result, anyhow};
use serde::Deserialize;
use std::env;
use tracing::{info, warn};

// Import logging macros
use crate::stats::MAX_WINDOW_DAYS;
use crate::{log_system_event, log_validation};

pub const DEFAULT_DATABASE_URL: &str = "sqlite:ai_scholar.db?mode=rwc";
pub const DEFAULT_LOG_LEVEL: &str = "info,ai_scholar=debug";
pub const DEFAULT_ACCURACY_WINDOW_DAYS: i64 = 30;

/// Complete application configuration loaded from environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub review: ReviewConfig,
}

/// Database connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

/// Logging system configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file_enabled: bool,
    pub console_enabled: bool,
    pub log_directory: String,
}

/// Review reporting configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ReviewConfig {
    /// Default look-back window for accuracy statistics
    pub accuracy_window_days: i64,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults
    pub fn from_env() -> Result<Self> {
        log_system_event!(config, "Loading application configuration from environment variables");

        let config = Config {
            database: DatabaseConfig::from_env()?,
            server: ServerConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
            review: ReviewConfig::from_env()?,
        };

        log_system_event!(config, "Configuration loaded successfully");

        Ok(config)
    }

    /// Log a summary of loaded configuration (without sensitive data)
    pub fn log_configuration_summary(&self) {
        info!(
            database_url_masked = %mask_sensitive_data(&self.database.url),
            server_address = %self.server.address(),
            log_level = %self.logging.level,
            accuracy_window_days = self.review.accuracy_window_days,
            "Configuration summary"
        );
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !self.database.url.starts_with("sqlite:") {
            return Err(rejected("DATABASE_URL must start with 'sqlite:'".to_string()));
        }

        if self.server.port == 0 {
            return Err(rejected("Server port must be greater than 0".to_string()));
        }

        if !(1..=MAX_WINDOW_DAYS).contains(&self.review.accuracy_window_days) {
            return Err(rejected(format!(
                "ACCURACY_WINDOW_DAYS must be between 1 and {}, got {}",
                MAX_WINDOW_DAYS, self.review.accuracy_window_days
            )));
        }

        if !["trace", "debug", "info", "warn", "error"]
            .iter()
            .any(|level| self.logging.level.to_lowercase().contains(level))
        {
            warn!("Unrecognised log level '{}', the default filter will be used", self.logging.level);
        }

        log_validation!(success, "configuration", "Configuration validation completed successfully");
        Ok(())
    }
}

impl DatabaseConfig {
    fn from_env() -> Result<Self> {
        let url = env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());

        Ok(DatabaseConfig { url })
    }
}

impl ServerConfig {
    fn from_env() -> Result<Self> {
        let port_str = env::var("PORT").unwrap_or_else(|_| "3000".to_string());

        let port = port_str.parse::<u16>().map_err(|_| {
            anyhow!("Invalid PORT value: '{}'. Must be a number between 1-65535", port_str)
        })?;

        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        Ok(ServerConfig { port, host })
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl LoggingConfig {
    fn from_env() -> Result<Self> {
        let level = env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string());

        let file_enabled = env::var("LOG_FILE_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse::<bool>()
            .unwrap_or(true);

        let console_enabled = env::var("LOG_CONSOLE_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse::<bool>()
            .unwrap_or(true);

        let log_directory = env::var("LOG_DIRECTORY").unwrap_or_else(|_| "logs".to_string());

        Ok(LoggingConfig {
            level,
            file_enabled,
            console_enabled,
            log_directory,
        })
    }
}

impl ReviewConfig {
    fn from_env() -> Result<Self> {
        let window_str = env::var("ACCURACY_WINDOW_DAYS")
            .unwrap_or_else(|_| DEFAULT_ACCURACY_WINDOW_DAYS.to_string());

        let accuracy_window_days = window_str
            .parse::<i64>()
            .map_err(|_| anyhow!("Invalid ACCURACY_WINDOW_DAYS value: '{}'", window_str))?;

        Ok(ReviewConfig { accuracy_window_days })
    }
}

fn rejected(message: String) -> anyhow::Error {
    log_validation!(failure, "configuration", error = message);
    anyhow!(message)
}

/// Mask sensitive data in configuration for safe logging
fn mask_sensitive_data(data: &str) -> String {
    let chars: Vec<char> = data.chars().collect();
    if chars.len() <= 8 {
        "*".repeat(chars.len())
    } else {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}***{}", head, tail)
    }
}
