//! Outbound payment-processor boundary.
//!
//! Two calls cross it: creating a hosted checkout session for the checkout
//! endpoint, and retrieving a subscription's status/period when a checkout
//! event carries only the subscription id. The trait keeps the reconciler
//! and the handlers testable without network access.

use std::env;

use serde::Deserialize;
use thiserror::Error;

use crate::billing::events::Subscription;

/// Stripe REST API base.
const DEFAULT_API_BASE: &str = "https://api.stripe.com";

/// Errors from the outbound processor boundary.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// A required environment variable is not set.
    #[error("{0} environment variable not set")]
    NotConfigured(&'static str),

    /// The request could not be sent or the response not decoded.
    #[error("gateway request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The processor answered with an error status.
    #[error("gateway answered {status}: {message}")]
    Api {
        /// HTTP status the processor answered with.
        status: u16,
        /// Error body, truncated.
        message: String,
    },

    /// The processor created a session but returned no redirect URL.
    #[error("no checkout URL returned")]
    MissingCheckoutUrl,
}

/// Result type alias for gateway operations.
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// Request to create a hosted checkout session.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    /// Email of the authenticated customer; also attached as
    /// `customerEmail` metadata so the webhook can resolve the user.
    pub customer_email: String,
}

/// A created checkout session.
#[derive(Debug, Clone)]
pub struct CreatedCheckout {
    /// Session id (cs_...).
    pub id: String,
    /// Hosted checkout URL to redirect the customer to.
    pub url: String,
}

/// The processor operations the rest of the crate needs.
#[async_trait::async_trait]
pub trait PaymentGateway: Send + Sync + 'static {
    /// Create a subscription-mode hosted checkout session.
    async fn create_checkout_session(
        &self,
        request: CheckoutRequest,
    ) -> GatewayResult<CreatedCheckout>;

    /// Retrieve a subscription's current status and period.
    async fn retrieve_subscription(&self, subscription_id: &str) -> GatewayResult<Subscription>;
}

/// Connection settings for the Stripe REST API.
#[derive(Debug, Clone)]
pub struct StripeConfig {
    /// Secret API key.
    pub secret_key: String,
    /// Price id of the subscription tier.
    pub price_id: String,
    /// Public site URL, used for success/cancel redirects.
    pub public_url: String,
    /// API base; overridable for tests.
    pub api_base: String,
}

impl StripeConfig {
    /// Load from the environment.
    ///
    /// # Environment Variables
    ///
    /// - `STRIPE_SECRET_KEY` (required)
    /// - `PRODUCT_PRICE_ID` (required)
    /// - `PUBLIC_URL` (optional, default `https://lockin.app`)
    pub fn from_env() -> GatewayResult<Self> {
        let secret_key = env::var("STRIPE_SECRET_KEY")
            .map_err(|_| GatewayError::NotConfigured("STRIPE_SECRET_KEY"))?;
        let price_id = env::var("PRODUCT_PRICE_ID")
            .map_err(|_| GatewayError::NotConfigured("PRODUCT_PRICE_ID"))?;
        let public_url =
            env::var("PUBLIC_URL").unwrap_or_else(|_| "https://lockin.app".to_string());
        Ok(Self {
            secret_key,
            price_id,
            public_url: public_url.trim_end_matches('/').to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
        })
    }
}

/// Stripe REST client.
#[derive(Debug, Clone)]
pub struct StripeClient {
    http: reqwest::Client,
    config: StripeConfig,
}

#[derive(Debug, Deserialize)]
struct CheckoutSessionResponse {
    id: String,
    url: Option<String>,
}

impl StripeClient {
    /// Build a client from connection settings.
    pub fn new(config: StripeConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Build a client from the environment.
    pub fn from_env() -> GatewayResult<Self> {
        Ok(Self::new(StripeConfig::from_env()?))
    }

    async fn check(response: reqwest::Response) -> GatewayResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let mut message = response.text().await.unwrap_or_default();
        message.truncate(512);
        Err(GatewayError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait::async_trait]
impl PaymentGateway for StripeClient {
    async fn create_checkout_session(
        &self,
        request: CheckoutRequest,
    ) -> GatewayResult<CreatedCheckout> {
        let success_url = format!(
            "{}/success?session_id={{CHECKOUT_SESSION_ID}}",
            self.config.public_url
        );
        let params: Vec<(&str, &str)> = vec![
            ("payment_method_types[]", "card"),
            ("line_items[0][price]", &self.config.price_id),
            ("line_items[0][quantity]", "1"),
            ("mode", "subscription"),
            ("success_url", &success_url),
            ("cancel_url", &self.config.public_url),
            ("customer_email", &request.customer_email),
            ("metadata[customerEmail]", &request.customer_email),
        ];

        let response = self
            .http
            .post(format!("{}/v1/checkout/sessions", self.config.api_base))
            .bearer_auth(&self.config.secret_key)
            .form(&params)
            .send()
            .await?;
        let session: CheckoutSessionResponse = Self::check(response).await?.json().await?;

        tracing::info!(session_id = %session.id, "created checkout session");

        let url = session.url.ok_or(GatewayError::MissingCheckoutUrl)?;
        Ok(CreatedCheckout {
            id: session.id,
            url,
        })
    }

    async fn retrieve_subscription(&self, subscription_id: &str) -> GatewayResult<Subscription> {
        let response = self
            .http
            .get(format!(
                "{}/v1/subscriptions/{subscription_id}",
                self.config.api_base
            ))
            .bearer_auth(&self.config.secret_key)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }
}
