//! Webhook endpoint configuration.
//!
//! The signature scheme is parametrized here - header name, scheme tag, and
//! tolerance window - rather than hardcoded in the verifier, so a processor
//! rotating its scheme version is a config change, not a code change.
//!
//! Secrets are loaded from environment variables only.

use std::env;
use std::time::Duration;

use thiserror::Error;

/// Default signature header, per the processor's convention.
pub const DEFAULT_SIGNATURE_HEADER: &str = "stripe-signature";

/// Default signature scheme tag within the header.
pub const DEFAULT_SCHEME: &str = "v1";

/// Default replay-protection tolerance.
pub const DEFAULT_TOLERANCE: Duration = Duration::from_secs(300);

/// Default bound on the resolve-and-apply store window.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(15);

/// Configuration errors for the webhook endpoint.
#[derive(Error, Debug)]
pub enum WebhookConfigError {
    /// `STRIPE_WEBHOOK_SECRET` is not set.
    #[error("STRIPE_WEBHOOK_SECRET environment variable not set")]
    MissingSecret,

    /// A numeric setting did not parse.
    #[error("invalid value for {name}: {value}")]
    InvalidValue {
        /// Variable name.
        name: &'static str,
        /// Offending value.
        value: String,
    },
}

/// Settings for the inbound webhook endpoint.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Shared signing secret.
    pub secret: String,
    /// Header carrying the signature (`stripe-signature` by default).
    pub signature_header: String,
    /// Scheme tag of the signature entries within the header (`v1`).
    pub scheme: String,
    /// Replay-protection window around the signed timestamp.
    pub tolerance: Duration,
    /// Upper bound on the resolve-and-apply phase; expiry fails the request.
    pub store_timeout: Duration,
}

impl WebhookConfig {
    /// Load from the environment.
    ///
    /// # Environment Variables
    ///
    /// - `STRIPE_WEBHOOK_SECRET` (required): shared signing secret
    /// - `LOCKIN_WEBHOOK_TOLERANCE_SECS` (optional): replay window, default 300
    /// - `LOCKIN_STORE_TIMEOUT_SECS` (optional): store bound, default 15
    pub fn from_env() -> Result<Self, WebhookConfigError> {
        let secret =
            env::var("STRIPE_WEBHOOK_SECRET").map_err(|_| WebhookConfigError::MissingSecret)?;
        if secret.is_empty() {
            return Err(WebhookConfigError::MissingSecret);
        }

        let tolerance = read_secs("LOCKIN_WEBHOOK_TOLERANCE_SECS", DEFAULT_TOLERANCE)?;
        let store_timeout = read_secs("LOCKIN_STORE_TIMEOUT_SECS", DEFAULT_STORE_TIMEOUT)?;

        Ok(Self {
            secret,
            signature_header: DEFAULT_SIGNATURE_HEADER.to_string(),
            scheme: DEFAULT_SCHEME.to_string(),
            tolerance,
            store_timeout,
        })
    }

    /// Fixed settings for tests.
    pub fn test_config() -> Self {
        Self {
            secret: "whsec_test123secret456".to_string(),
            signature_header: DEFAULT_SIGNATURE_HEADER.to_string(),
            scheme: DEFAULT_SCHEME.to_string(),
            tolerance: DEFAULT_TOLERANCE,
            store_timeout: Duration::from_secs(2),
        }
    }
}

fn read_secs(name: &'static str, default: Duration) -> Result<Duration, WebhookConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| WebhookConfigError::InvalidValue { name, value: raw }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = WebhookConfig::test_config();
        assert_eq!(config.signature_header, "stripe-signature");
        assert_eq!(config.scheme, "v1");
        assert_eq!(config.tolerance, Duration::from_secs(300));
    }
}
