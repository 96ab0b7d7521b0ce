//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    pub openai_api_key: String,
    /// Alternate OpenAI-compatible endpoint; the client default when unset.
    pub openai_api_base: Option<String>,
    pub chat_model: String,
    pub chat_max_tokens: u32,
    pub catalog_base_url: String,
    pub covers_base_url: String,
    pub static_dir: PathBuf,
    pub cors_origin: Option<String>,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        // --- Load Server and Database Settings ---
        let bind_address_str = match var("PORT") {
            Some(port) => format!("0.0.0.0:{}", port.trim()),
            None => var("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:3001".to_string()),
        };
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url =
            var("DATABASE_URL").unwrap_or_else(|| "sqlite://data/marginalia.db".to_string());

        let log_level_str = var("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Load LLM Settings ---
        let openai_api_key =
            var("OPENAI_API_KEY").ok_or_else(|| ConfigError::MissingVar("OPENAI_API_KEY".to_string()))?;
        let openai_api_base = var("OPENAI_API_BASE");
        let chat_model = var("CHAT_MODEL").unwrap_or_else(|| "gpt-4o".to_string());

        let chat_max_tokens = match var("CHAT_MAX_TOKENS") {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| {
                    ConfigError::InvalidValue(
                        "CHAT_MAX_TOKENS".to_string(),
                        format!("'{}' is not a positive integer", raw),
                    )
                })?,
            None => 4096,
        };

        // --- Load Catalog and Static Asset Settings ---
        let catalog_base_url =
            var("CATALOG_BASE_URL").unwrap_or_else(|| "https://openlibrary.org".to_string());
        let covers_base_url = var("COVERS_BASE_URL")
            .unwrap_or_else(|| "https://covers.openlibrary.org".to_string());
        let static_dir = var("STATIC_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./client/dist"));
        let cors_origin = var("CORS_ORIGIN");

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            openai_api_key,
            openai_api_base,
            chat_model,
            chat_max_tokens,
            catalog_base_url: catalog_base_url.trim_end_matches('/').to_string(),
            covers_base_url: covers_base_url.trim_end_matches('/').to_string(),
            static_dir,
            cors_origin,
        })
    }
}
