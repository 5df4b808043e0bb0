//! PostgREST-backed store.
//!
//! Speaks the Supabase REST conventions: filter query strings, upserts via
//! `Prefer` headers, and conditional updates via an `updated_at=lt.{ts}`
//! filter - the filter is what makes the ordering guard a per-row
//! compare-and-set on the database side, so concurrent deliveries converge
//! without application-level locking.

use std::env;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use super::{
    EntitlementStore, InsertOutcome, NewProfile, NewPurchase, ProfileRecord, StoreError,
    StoreResult, SubscriptionChange, SubscriptionRecord, SubscriptionUpsert, UpdateOutcome,
    UpsertOutcome,
};

/// Default per-request timeout for store calls.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection settings for the PostgREST store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Base URL of the Supabase project (no trailing slash).
    pub url: String,
    /// Service-role key; sent as both `apikey` and bearer token.
    pub service_key: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

/// Configuration errors for the store boundary.
#[derive(Error, Debug)]
pub enum StoreConfigError {
    /// A required environment variable is not set.
    #[error("{0} environment variable not set")]
    MissingVar(&'static str),
}

impl StoreConfig {
    /// Load from `SUPABASE_URL` and `SUPABASE_SERVICE_ROLE_KEY`.
    pub fn from_env() -> Result<Self, StoreConfigError> {
        let url = env::var("SUPABASE_URL")
            .map_err(|_| StoreConfigError::MissingVar("SUPABASE_URL"))?;
        let service_key = env::var("SUPABASE_SERVICE_ROLE_KEY")
            .map_err(|_| StoreConfigError::MissingVar("SUPABASE_SERVICE_ROLE_KEY"))?;
        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            service_key,
            timeout: DEFAULT_TIMEOUT,
        })
    }
}

/// [`EntitlementStore`] implementation over PostgREST.
#[derive(Debug, Clone)]
pub struct RestStore {
    http: reqwest::Client,
    base: String,
}

impl RestStore {
    /// Build a store client from connection settings.
    pub fn new(config: StoreConfig) -> StoreResult<Self> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&config.service_key)
            .map_err(|_| StoreError::Unavailable("service key is not a valid header".into()))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.service_key))
            .map_err(|_| StoreError::Unavailable("service key is not a valid header".into()))?;
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        Ok(Self {
            http,
            base: format!("{}/rest/v1", config.url),
        })
    }

    fn table(&self, name: &str) -> String {
        format!("{}/{}", self.base, name)
    }

    async fn rows<T: DeserializeOwned>(&self, response: reqwest::Response) -> StoreResult<Vec<T>> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Unavailable(format!("{status}: {body}")));
        }
        response
            .json::<Vec<T>>()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }

    fn send_error(e: reqwest::Error) -> StoreError {
        StoreError::Unavailable(e.to_string())
    }

    /// Conditional PATCH guarded by `updated_at=lt.{event_time}`; returns the
    /// rows the database actually touched.
    async fn guarded_subscription_patch(
        &self,
        stripe_subscription_id: &str,
        change: &SubscriptionChange,
    ) -> StoreResult<Vec<SubscriptionRecord>> {
        let response = self
            .http
            .patch(self.table("subscriptions"))
            .query(&[
                (
                    "stripe_subscription_id",
                    format!("eq.{stripe_subscription_id}"),
                ),
                ("updated_at", format!("lt.{}", change.event_time.to_rfc3339())),
            ])
            .header("Prefer", "return=representation")
            .json(&json!({
                "status": change.status,
                "current_period_start": change.current_period_start,
                "current_period_end": change.current_period_end,
                "cancel_at_period_end": change.cancel_at_period_end,
                "updated_at": change.event_time,
            }))
            .send()
            .await
            .map_err(Self::send_error)?;
        self.rows(response).await
    }
}

#[async_trait::async_trait]
impl EntitlementStore for RestStore {
    async fn profile(&self, user_id: Uuid) -> StoreResult<Option<ProfileRecord>> {
        let response = self
            .http
            .get(self.table("profiles"))
            .query(&[("id", format!("eq.{user_id}")), ("limit", "1".into())])
            .send()
            .await
            .map_err(Self::send_error)?;
        Ok(self.rows::<ProfileRecord>(response).await?.into_iter().next())
    }

    async fn profiles_by_email(&self, email: &str) -> StoreResult<Vec<ProfileRecord>> {
        // `ilike` without wildcards is a case-insensitive equality match.
        let response = self
            .http
            .get(self.table("profiles"))
            .query(&[("email", format!("ilike.{email}"))])
            .send()
            .await
            .map_err(Self::send_error)?;
        self.rows(response).await
    }

    async fn create_profile(&self, profile: NewProfile) -> StoreResult<ProfileRecord> {
        let response = self
            .http
            .post(self.table("profiles"))
            .header("Prefer", "return=representation")
            .json(&json!({
                "id": profile.id,
                "email": profile.email,
                "username": profile.username,
                "has_active_subscription": false,
                "updated_at": Utc::now(),
            }))
            .send()
            .await
            .map_err(Self::send_error)?;
        self.rows::<ProfileRecord>(response)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Decode("insert returned no representation".into()))
    }

    async fn set_entitlement(
        &self,
        user_id: Uuid,
        entitled: bool,
        stripe_customer_id: Option<String>,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut body = json!({
            "has_active_subscription": entitled,
            "updated_at": at,
        });
        if let Some(customer) = stripe_customer_id {
            body["stripe_customer_id"] = json!(customer);
        }

        let response = self
            .http
            .patch(self.table("profiles"))
            .query(&[("id", format!("eq.{user_id}"))])
            .header("Prefer", "return=representation")
            .json(&body)
            .send()
            .await
            .map_err(Self::send_error)?;
        Ok(!self.rows::<ProfileRecord>(response).await?.is_empty())
    }

    async fn subscription_by_external_id(
        &self,
        stripe_subscription_id: &str,
    ) -> StoreResult<Option<SubscriptionRecord>> {
        let response = self
            .http
            .get(self.table("subscriptions"))
            .query(&[
                (
                    "stripe_subscription_id",
                    format!("eq.{stripe_subscription_id}"),
                ),
                ("limit", "1".into()),
            ])
            .send()
            .await
            .map_err(Self::send_error)?;
        Ok(self
            .rows::<SubscriptionRecord>(response)
            .await?
            .into_iter()
            .next())
    }

    async fn active_subscription_for_user(
        &self,
        user_id: Uuid,
    ) -> StoreResult<Option<SubscriptionRecord>> {
        let response = self
            .http
            .get(self.table("subscriptions"))
            .query(&[
                ("user_id", format!("eq.{user_id}")),
                ("status", "in.(active,trialing)".into()),
                ("order", "updated_at.desc".into()),
                ("limit", "1".into()),
            ])
            .send()
            .await
            .map_err(Self::send_error)?;
        Ok(self
            .rows::<SubscriptionRecord>(response)
            .await?
            .into_iter()
            .next())
    }

    async fn upsert_subscription(&self, upsert: SubscriptionUpsert) -> StoreResult<UpsertOutcome> {
        let existing = self
            .subscription_by_external_id(&upsert.stripe_subscription_id)
            .await?;

        if existing.is_none() {
            let response = self
                .http
                .post(self.table("subscriptions"))
                .header("Prefer", "return=minimal")
                .json(&json!({
                    "user_id": upsert.user_id,
                    "stripe_subscription_id": upsert.stripe_subscription_id,
                    "status": upsert.status,
                    "current_period_start": upsert.current_period_start,
                    "current_period_end": upsert.current_period_end,
                    "cancel_at_period_end": upsert.cancel_at_period_end,
                    "created_at": upsert.event_time,
                    "updated_at": upsert.event_time,
                }))
                .send()
                .await
                .map_err(Self::send_error)?;

            match response.status() {
                // Lost an insert race to a concurrent delivery; fall through
                // to the guarded update below.
                StatusCode::CONFLICT => {}
                status if status.is_success() => return Ok(UpsertOutcome::Inserted),
                status => {
                    let body = response.text().await.unwrap_or_default();
                    return Err(StoreError::Unavailable(format!("{status}: {body}")));
                }
            }
        }

        let change = SubscriptionChange {
            status: upsert.status,
            current_period_start: upsert.current_period_start,
            current_period_end: upsert.current_period_end,
            cancel_at_period_end: upsert.cancel_at_period_end,
            event_time: upsert.event_time,
        };
        let touched = self
            .guarded_subscription_patch(&upsert.stripe_subscription_id, &change)
            .await?;
        if touched.is_empty() {
            Ok(UpsertOutcome::Stale)
        } else {
            Ok(UpsertOutcome::Updated)
        }
    }

    async fn update_subscription_if_newer(
        &self,
        stripe_subscription_id: &str,
        change: SubscriptionChange,
    ) -> StoreResult<UpdateOutcome> {
        let touched = self
            .guarded_subscription_patch(stripe_subscription_id, &change)
            .await?;
        if !touched.is_empty() {
            return Ok(UpdateOutcome::Applied);
        }
        // Nothing matched the guard: either the row does not exist, or it
        // already carries a newer event.
        match self
            .subscription_by_external_id(stripe_subscription_id)
            .await?
        {
            Some(_) => Ok(UpdateOutcome::Stale),
            None => Ok(UpdateOutcome::NotFound),
        }
    }

    async fn record_purchase(&self, purchase: NewPurchase) -> StoreResult<InsertOutcome> {
        let response = self
            .http
            .post(self.table("purchases"))
            .header("Prefer", "return=minimal")
            .json(&json!({
                "user_id": purchase.user_id,
                "stripe_checkout_id": purchase.stripe_checkout_id,
                "stripe_payment_intent_id": purchase.stripe_payment_intent_id,
                "stripe_price_id": purchase.stripe_price_id,
                "amount": purchase.amount,
                "currency": purchase.currency,
                "status": purchase.status,
                "created_at": purchase.event_time,
                "updated_at": purchase.event_time,
            }))
            .send()
            .await
            .map_err(Self::send_error)?;

        match response.status() {
            StatusCode::CONFLICT => Ok(InsertOutcome::Duplicate),
            status if status.is_success() => Ok(InsertOutcome::Inserted),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(StoreError::Unavailable(format!("{status}: {body}")))
            }
        }
    }
}
