//! Application configuration.
//!
//! Everything sensitive comes from environment variables; the binary's
//! flags only cover bind address and verbosity. The webhook and payment
//! gateway settings have their own loaders in [`crate::billing`].

use std::env;

use thiserror::Error;

/// Default CORS origins: the public site plus the local dev frontend.
pub const DEFAULT_ALLOWED_ORIGINS: &[&str] = &["https://lockin.app", "http://localhost:3000"];

/// Default bucket holding release artifacts.
pub const DEFAULT_APP_BUCKET: &str = "app-builds";

/// Default object path of the macOS build.
pub const DEFAULT_MAC_APP_PATH: &str = "Lockin.dmg";

/// Default lifetime of a signed download URL (10 minutes).
pub const DEFAULT_DOWNLOAD_TTL_SECS: u64 = 600;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required environment variable is not set.
    #[error("{0} environment variable not set")]
    MissingVar(&'static str),

    /// A numeric setting did not parse.
    #[error("invalid value for {name}: {value}")]
    InvalidValue {
        /// Variable name.
        name: &'static str,
        /// Offending value.
        value: String,
    },
}

/// Settings for the HTTP surface outside the billing module.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Supabase project URL.
    pub supabase_url: String,
    /// Public (anon) key, used for token validation.
    pub supabase_anon_key: String,
    /// Service-role key, used for store and storage access.
    pub supabase_service_key: String,
    /// Origins the CORS layer admits.
    pub allowed_origins: Vec<String>,
    /// Bucket holding release artifacts.
    pub app_bucket: String,
    /// Object path of the macOS build.
    pub mac_app_path: String,
    /// Lifetime of signed download URLs, in seconds.
    pub download_ttl_secs: u64,
}

impl AppConfig {
    /// Load from the environment.
    ///
    /// # Environment Variables
    ///
    /// - `SUPABASE_URL` (required)
    /// - `SUPABASE_ANON_KEY` (required)
    /// - `SUPABASE_SERVICE_ROLE_KEY` (required)
    /// - `LOCKIN_ALLOWED_ORIGINS` (optional): comma-separated origin list
    /// - `LOCKIN_APP_BUCKET` (optional, default `app-builds`)
    /// - `LOCKIN_MAC_APP_PATH` (optional, default `Lockin.dmg`)
    /// - `LOCKIN_DOWNLOAD_TTL_SECS` (optional, default 600)
    pub fn from_env() -> Result<Self, ConfigError> {
        let supabase_url =
            env::var("SUPABASE_URL").map_err(|_| ConfigError::MissingVar("SUPABASE_URL"))?;
        let supabase_url = url::Url::parse(&supabase_url)
            .map_err(|_| ConfigError::InvalidValue {
                name: "SUPABASE_URL",
                value: supabase_url,
            })?
            .to_string();
        let supabase_anon_key = env::var("SUPABASE_ANON_KEY")
            .map_err(|_| ConfigError::MissingVar("SUPABASE_ANON_KEY"))?;
        let supabase_service_key = env::var("SUPABASE_SERVICE_ROLE_KEY")
            .map_err(|_| ConfigError::MissingVar("SUPABASE_SERVICE_ROLE_KEY"))?;

        let allowed_origins = match env::var("LOCKIN_ALLOWED_ORIGINS") {
            Ok(raw) => raw
                .split(',')
                .map(|origin| origin.trim().trim_end_matches('/').to_string())
                .filter(|origin| !origin.is_empty())
                .collect(),
            Err(_) => DEFAULT_ALLOWED_ORIGINS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        };

        let download_ttl_secs = match env::var("LOCKIN_DOWNLOAD_TTL_SECS") {
            Ok(raw) => raw
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidValue {
                    name: "LOCKIN_DOWNLOAD_TTL_SECS",
                    value: raw,
                })?,
            Err(_) => DEFAULT_DOWNLOAD_TTL_SECS,
        };

        Ok(Self {
            supabase_url: supabase_url.trim_end_matches('/').to_string(),
            supabase_anon_key,
            supabase_service_key,
            allowed_origins,
            app_bucket: env::var("LOCKIN_APP_BUCKET")
                .unwrap_or_else(|_| DEFAULT_APP_BUCKET.to_string()),
            mac_app_path: env::var("LOCKIN_MAC_APP_PATH")
                .unwrap_or_else(|_| DEFAULT_MAC_APP_PATH.to_string()),
            download_ttl_secs,
        })
    }

    /// Fixed settings for tests.
    pub fn test_config() -> Self {
        Self {
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "anon_test".to_string(),
            supabase_service_key: "service_test".to_string(),
            allowed_origins: DEFAULT_ALLOWED_ORIGINS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            app_bucket: DEFAULT_APP_BUCKET.to_string(),
            mac_app_path: DEFAULT_MAC_APP_PATH.to_string(),
            download_ttl_secs: DEFAULT_DOWNLOAD_TTL_SECS,
        }
    }
}
