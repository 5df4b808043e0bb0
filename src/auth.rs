//! Authenticated-principal resolution.
//!
//! The identity provider (sessions, passwords, token issuance) is an
//! external collaborator; this module only turns an inbound request into a
//! [`Principal`] or `Unauthenticated`. Every protected handler goes through
//! the same [`resolve_principal`] - there is deliberately no per-endpoint
//! fallback logic.
//!
//! Precedence is deterministic: a `Authorization: Bearer` token is tried
//! first, the session cookie second. The first credential that validates
//! wins.

use std::collections::HashMap;
use std::env;

use chrono::{DateTime, Utc};
use http::header::{AUTHORIZATION, COOKIE};
use http::HeaderMap;
use parking_lot::RwLock;
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

/// Name of the session cookie the web frontend sets.
pub const SESSION_COOKIE: &str = "sb-access-token";

/// Errors from principal resolution.
#[derive(Error, Debug)]
pub enum AuthError {
    /// No credential was presented, or none validated.
    #[error("not authenticated")]
    Unauthenticated,

    /// The identity provider could not be reached or answered strangely.
    #[error("identity provider error: {0}")]
    Provider(String),
}

/// An authenticated user, as vouched for by the identity provider.
#[derive(Debug, Clone)]
pub struct Principal {
    /// User id.
    pub user_id: Uuid,
    /// Email on record.
    pub email: String,
    /// Display name, if the user set one at sign-up.
    pub username: Option<String>,
    /// Account creation time.
    pub created_at: Option<DateTime<Utc>>,
}

/// Token validation boundary.
#[async_trait::async_trait]
pub trait IdentityProvider: Send + Sync + 'static {
    /// Validate a token. `Ok(None)` means the token is invalid or expired;
    /// `Err` means the provider itself misbehaved.
    async fn user_for_token(&self, token: &str) -> Result<Option<Principal>, AuthError>;
}

/// Resolve the request's principal: bearer token first, session cookie
/// second.
pub async fn resolve_principal(
    headers: &HeaderMap,
    provider: &dyn IdentityProvider,
) -> Result<Principal, AuthError> {
    if let Some(token) = bearer_token(headers) {
        if let Some(principal) = provider.user_for_token(token).await? {
            return Ok(principal);
        }
    }
    if let Some(token) = cookie_token(headers) {
        if let Some(principal) = provider.user_for_token(token).await? {
            return Ok(principal);
        }
    }
    Err(AuthError::Unauthenticated)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

fn cookie_token(headers: &HeaderMap) -> Option<&str> {
    let cookies = headers.get(COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|cookie| {
        let (name, value) = cookie.trim().split_once('=')?;
        (name == SESSION_COOKIE).then_some(value)
    })
}

// =============================================================================
// REST identity provider
// =============================================================================

/// Identity provider speaking the Supabase auth REST convention.
#[derive(Debug, Clone)]
pub struct RestIdentityProvider {
    http: reqwest::Client,
    user_endpoint: String,
    anon_key: String,
}

#[derive(Debug, Deserialize)]
struct AuthUserResponse {
    id: Uuid,
    email: Option<String>,
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    user_metadata: serde_json::Value,
}

impl RestIdentityProvider {
    /// Build a provider client against a Supabase project.
    pub fn new(base_url: &str, anon_key: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            user_endpoint: format!("{}/auth/v1/user", base_url.trim_end_matches('/')),
            anon_key: anon_key.to_string(),
        }
    }

    /// Load from `SUPABASE_URL` and `SUPABASE_ANON_KEY`.
    pub fn from_env() -> Result<Self, AuthError> {
        let url = env::var("SUPABASE_URL")
            .map_err(|_| AuthError::Provider("SUPABASE_URL not set".to_string()))?;
        let anon_key = env::var("SUPABASE_ANON_KEY")
            .map_err(|_| AuthError::Provider("SUPABASE_ANON_KEY not set".to_string()))?;
        Ok(Self::new(&url, &anon_key))
    }
}

#[async_trait::async_trait]
impl IdentityProvider for RestIdentityProvider {
    async fn user_for_token(&self, token: &str) -> Result<Option<Principal>, AuthError> {
        let response = self
            .http
            .get(&self.user_endpoint)
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AuthError::Provider(e.to_string()))?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED
            || response.status() == reqwest::StatusCode::FORBIDDEN
        {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(AuthError::Provider(format!(
                "auth endpoint answered {}",
                response.status()
            )));
        }

        let user: AuthUserResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Provider(e.to_string()))?;

        Ok(Some(Principal {
            user_id: user.id,
            email: user.email.unwrap_or_default(),
            username: user
                .user_metadata
                .get("username")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            created_at: user.created_at,
        }))
    }
}

// =============================================================================
// Static identity provider (tests, local development)
// =============================================================================

/// Fixed token-to-user mapping; stands in for the real provider in tests
/// and local runs.
#[derive(Debug, Default)]
pub struct StaticIdentityProvider {
    tokens: RwLock<HashMap<String, Principal>>,
}

impl StaticIdentityProvider {
    /// Create an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a token for a principal.
    pub fn insert_token(&self, token: &str, principal: Principal) {
        self.tokens.write().insert(token.to_string(), principal);
    }
}

#[async_trait::async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn user_for_token(&self, token: &str) -> Result<Option<Principal>, AuthError> {
        Ok(self.tokens.read().get(token).cloned())
    }
}

#[cfg(test)]
mod tests {
    use http::HeaderValue;

    use super::*;

    fn principal(email: &str) -> Principal {
        Principal {
            user_id: Uuid::new_v4(),
            email: email.to_string(),
            username: None,
            created_at: None,
        }
    }

    fn provider_with(token: &str, email: &str) -> StaticIdentityProvider {
        let provider = StaticIdentityProvider::new();
        provider.insert_token(token, principal(email));
        provider
    }

    #[tokio::test]
    async fn bearer_token_resolves() {
        let provider = provider_with("tok_1", "user@example.com");
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer tok_1"));

        let p = resolve_principal(&headers, &provider).await.unwrap();
        assert_eq!(p.email, "user@example.com");
    }

    #[tokio::test]
    async fn session_cookie_resolves() {
        let provider = provider_with("tok_2", "user@example.com");
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; sb-access-token=tok_2; lang=en"),
        );

        assert!(resolve_principal(&headers, &provider).await.is_ok());
    }

    #[tokio::test]
    async fn bearer_takes_precedence_over_cookie() {
        let provider = StaticIdentityProvider::new();
        provider.insert_token("bearer_tok", principal("bearer@example.com"));
        provider.insert_token("cookie_tok", principal("cookie@example.com"));

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer bearer_tok"));
        headers.insert(
            COOKIE,
            HeaderValue::from_static("sb-access-token=cookie_tok"),
        );

        let p = resolve_principal(&headers, &provider).await.unwrap();
        assert_eq!(p.email, "bearer@example.com");
    }

    #[tokio::test]
    async fn invalid_bearer_falls_back_to_cookie() {
        let provider = provider_with("cookie_tok", "cookie@example.com");
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer expired"));
        headers.insert(
            COOKIE,
            HeaderValue::from_static("sb-access-token=cookie_tok"),
        );

        let p = resolve_principal(&headers, &provider).await.unwrap();
        assert_eq!(p.email, "cookie@example.com");
    }

    #[tokio::test]
    async fn no_credentials_is_unauthenticated() {
        let provider = StaticIdentityProvider::new();
        let headers = HeaderMap::new();

        assert!(matches!(
            resolve_principal(&headers, &provider).await,
            Err(AuthError::Unauthenticated)
        ));
    }
}
