//! Entitlement Store
//!
//! The relational store behind the reconciler: `profiles`, `subscriptions`,
//! and `purchases`. The store itself is an external collaborator (a
//! Supabase/PostgREST instance in production); this module specifies the
//! interface the rest of the crate needs and ships two implementations:
//!
//! - [`RestStore`]: PostgREST conventions over reqwest
//! - [`MemoryStore`]: parking_lot-guarded maps for tests and local runs
//!
//! Both implementations provide the same write semantics:
//!
//! - subscriptions are keyed by the processor-assigned subscription id, and
//!   writes carrying an event time at or before the stored row's
//!   `updated_at` are skipped (last write wins by event time, not arrival
//!   order)
//! - purchases are append-only, keyed by checkout id; a duplicate insert is
//!   a no-op
//!
//! Rows are never deleted, only status-transitioned.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::billing::events::SubscriptionStatus;

pub mod memory;
pub mod rest;

pub use memory::MemoryStore;
pub use rest::{RestStore, StoreConfig};

/// Errors surfaced by store implementations.
///
/// All variants are treated as retryable by the webhook boundary: the
/// processor redelivers the event and the idempotent writes converge.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store could not be reached or answered with a server error.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store answered with a payload we could not decode.
    #[error("store returned an unexpected payload: {0}")]
    Decode(String),
}

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

// =============================================================================
// Records
// =============================================================================

/// A row in `profiles` (1:1 with an identity-provider user).
///
/// `has_active_subscription` is a derived flag, recomputed by the reconciler
/// from the subscription rows; it is never the source of truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileRecord {
    /// User id (assigned by the identity provider).
    pub id: Uuid,
    /// Email, matched case-insensitively during identity resolution.
    pub email: String,
    /// Optional display name.
    pub username: Option<String>,
    /// Derived entitlement flag.
    pub has_active_subscription: bool,
    /// Billing-customer id assigned by the payment processor.
    pub stripe_customer_id: Option<String>,
    /// Last reconciliation touch.
    pub updated_at: DateTime<Utc>,
}

/// A row in `subscriptions`, keyed by the processor's subscription id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    /// Row id.
    pub id: Uuid,
    /// Owning user.
    pub user_id: Uuid,
    /// Processor-assigned subscription id (unique).
    pub stripe_subscription_id: String,
    /// Subscription status as last reported by the processor.
    pub status: SubscriptionStatus,
    /// Current billing period start.
    pub current_period_start: DateTime<Utc>,
    /// Current billing period end.
    pub current_period_end: DateTime<Utc>,
    /// Whether the subscription ends at the period boundary.
    pub cancel_at_period_end: bool,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
    /// Event time of the last applied write (the ordering guard).
    pub updated_at: DateTime<Utc>,
}

/// A row in `purchases` (append-only, one-time payment mode).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseRecord {
    /// Row id.
    pub id: Uuid,
    /// Owning user.
    pub user_id: Uuid,
    /// Processor checkout-session id (unique, the idempotency key).
    pub stripe_checkout_id: String,
    /// Processor payment-intent id, when present on the event.
    pub stripe_payment_intent_id: Option<String>,
    /// Price the customer paid for.
    pub stripe_price_id: Option<String>,
    /// Amount in the smallest currency unit.
    pub amount: i64,
    /// ISO currency code.
    pub currency: String,
    /// Purchase status as reported by the processor.
    pub status: String,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
    /// Last touch.
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Write inputs and outcomes
// =============================================================================

/// Input for lazy profile creation (mirror of the identity-provider user).
#[derive(Debug, Clone, Serialize)]
pub struct NewProfile {
    /// User id from the identity provider.
    pub id: Uuid,
    /// Email from the identity provider.
    pub email: String,
    /// Display name, when the identity provider has one.
    pub username: Option<String>,
}

/// Input for a subscription upsert (checkout-completed path).
#[derive(Debug, Clone)]
pub struct SubscriptionUpsert {
    /// Owning user.
    pub user_id: Uuid,
    /// Processor subscription id (the upsert key).
    pub stripe_subscription_id: String,
    /// Status from the processor.
    pub status: SubscriptionStatus,
    /// Period start from the processor.
    pub current_period_start: DateTime<Utc>,
    /// Period end from the processor.
    pub current_period_end: DateTime<Utc>,
    /// Cancel-at-period-end flag from the processor.
    pub cancel_at_period_end: bool,
    /// Event time; becomes the row's `updated_at` when applied.
    pub event_time: DateTime<Utc>,
}

/// Input for a subscription status update (update/delete path).
#[derive(Debug, Clone)]
pub struct SubscriptionChange {
    /// New status.
    pub status: SubscriptionStatus,
    /// New period start.
    pub current_period_start: DateTime<Utc>,
    /// New period end.
    pub current_period_end: DateTime<Utc>,
    /// New cancel-at-period-end flag.
    pub cancel_at_period_end: bool,
    /// Event time; the write is skipped unless it is newer than the row.
    pub event_time: DateTime<Utc>,
}

/// Input for an append-only purchase record.
#[derive(Debug, Clone)]
pub struct NewPurchase {
    /// Owning user.
    pub user_id: Uuid,
    /// Processor checkout-session id (unique).
    pub stripe_checkout_id: String,
    /// Processor payment-intent id.
    pub stripe_payment_intent_id: Option<String>,
    /// Price id.
    pub stripe_price_id: Option<String>,
    /// Amount in the smallest currency unit.
    pub amount: i64,
    /// ISO currency code.
    pub currency: String,
    /// Purchase status.
    pub status: String,
    /// Event time.
    pub event_time: DateTime<Utc>,
}

/// Outcome of an upsert keyed on the external subscription id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No row existed; one was inserted.
    Inserted,
    /// A row existed and the event was newer; it was updated.
    Updated,
    /// A row existed with an `updated_at` at or past the event time; no-op.
    Stale,
}

/// Outcome of a conditional update keyed on the external subscription id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The row was updated.
    Applied,
    /// The row's `updated_at` was at or past the event time; no-op.
    Stale,
    /// No row carries that external id.
    NotFound,
}

/// Outcome of an append-only insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The row was inserted.
    Inserted,
    /// A row with the same external key already existed; no-op.
    Duplicate,
}

// =============================================================================
// Trait
// =============================================================================

/// The interface the reconciler and the page handlers need from the
/// relational store.
///
/// Implementations must make `upsert_subscription` and
/// `update_subscription_if_newer` atomic per row (compare-and-set on
/// `updated_at`), so concurrent redeliveries of the same or out-of-order
/// events converge without explicit locking.
#[async_trait::async_trait]
pub trait EntitlementStore: Send + Sync + 'static {
    /// Fetch a profile by user id.
    async fn profile(&self, user_id: Uuid) -> StoreResult<Option<ProfileRecord>>;

    /// Fetch every profile matching an email, case-insensitively.
    ///
    /// Returns all matches so the caller can distinguish "none" from
    /// "ambiguous" - the store never picks one.
    async fn profiles_by_email(&self, email: &str) -> StoreResult<Vec<ProfileRecord>>;

    /// Create a profile (lazy mirror of the identity-provider user).
    async fn create_profile(&self, profile: NewProfile) -> StoreResult<ProfileRecord>;

    /// Set the derived entitlement flag, optionally recording the billing
    /// customer id. Returns `false` when no profile exists for the user.
    async fn set_entitlement(
        &self,
        user_id: Uuid,
        entitled: bool,
        stripe_customer_id: Option<String>,
        at: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// Fetch a subscription row by the processor's subscription id.
    async fn subscription_by_external_id(
        &self,
        stripe_subscription_id: &str,
    ) -> StoreResult<Option<SubscriptionRecord>>;

    /// Fetch the user's most recently updated subscription in an entitled
    /// status, if any.
    async fn active_subscription_for_user(
        &self,
        user_id: Uuid,
    ) -> StoreResult<Option<SubscriptionRecord>>;

    /// Insert or update a subscription row keyed on the external id, with
    /// the event-time ordering guard.
    async fn upsert_subscription(&self, upsert: SubscriptionUpsert) -> StoreResult<UpsertOutcome>;

    /// Update an existing subscription row keyed on the external id, with
    /// the event-time ordering guard. Never inserts.
    async fn update_subscription_if_newer(
        &self,
        stripe_subscription_id: &str,
        change: SubscriptionChange,
    ) -> StoreResult<UpdateOutcome>;

    /// Append a purchase row keyed on the external checkout id.
    async fn record_purchase(&self, purchase: NewPurchase) -> StoreResult<InsertOutcome>;
}
