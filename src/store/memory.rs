//! In-memory store for tests and local development.
//!
//! Same semantics as the PostgREST-backed store: the ordering guard is
//! evaluated under the write lock, which stands in for the database's
//! per-row compare-and-set.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use super::{
    EntitlementStore, InsertOutcome, NewProfile, NewPurchase, ProfileRecord, PurchaseRecord,
    StoreResult, SubscriptionChange, SubscriptionRecord, SubscriptionUpsert, UpdateOutcome,
    UpsertOutcome,
};

/// In-memory [`EntitlementStore`] implementation.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Tables>,
}

#[derive(Debug, Default)]
struct Tables {
    /// Keyed by user id.
    profiles: HashMap<Uuid, ProfileRecord>,
    /// Keyed by the external subscription id (the unique column).
    subscriptions: HashMap<String, SubscriptionRecord>,
    /// Keyed by the external checkout id (the unique column).
    purchases: HashMap<String, PurchaseRecord>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of subscription rows (test assertions).
    pub fn subscription_count(&self) -> usize {
        self.inner.read().subscriptions.len()
    }

    /// Number of purchase rows (test assertions).
    pub fn purchase_count(&self) -> usize {
        self.inner.read().purchases.len()
    }
}

#[async_trait::async_trait]
impl EntitlementStore for MemoryStore {
    async fn profile(&self, user_id: Uuid) -> StoreResult<Option<ProfileRecord>> {
        Ok(self.inner.read().profiles.get(&user_id).cloned())
    }

    async fn profiles_by_email(&self, email: &str) -> StoreResult<Vec<ProfileRecord>> {
        let tables = self.inner.read();
        Ok(tables
            .profiles
            .values()
            .filter(|p| p.email.eq_ignore_ascii_case(email))
            .cloned()
            .collect())
    }

    async fn create_profile(&self, profile: NewProfile) -> StoreResult<ProfileRecord> {
        let record = ProfileRecord {
            id: profile.id,
            email: profile.email,
            username: profile.username,
            has_active_subscription: false,
            stripe_customer_id: None,
            updated_at: Utc::now(),
        };
        self.inner
            .write()
            .profiles
            .insert(record.id, record.clone());
        Ok(record)
    }

    async fn set_entitlement(
        &self,
        user_id: Uuid,
        entitled: bool,
        stripe_customer_id: Option<String>,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut tables = self.inner.write();
        match tables.profiles.get_mut(&user_id) {
            Some(profile) => {
                profile.has_active_subscription = entitled;
                if let Some(customer) = stripe_customer_id {
                    profile.stripe_customer_id = Some(customer);
                }
                profile.updated_at = at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn subscription_by_external_id(
        &self,
        stripe_subscription_id: &str,
    ) -> StoreResult<Option<SubscriptionRecord>> {
        Ok(self
            .inner
            .read()
            .subscriptions
            .get(stripe_subscription_id)
            .cloned())
    }

    async fn active_subscription_for_user(
        &self,
        user_id: Uuid,
    ) -> StoreResult<Option<SubscriptionRecord>> {
        let tables = self.inner.read();
        Ok(tables
            .subscriptions
            .values()
            .filter(|s| s.user_id == user_id && s.status.is_entitled())
            .max_by_key(|s| s.updated_at)
            .cloned())
    }

    async fn upsert_subscription(&self, upsert: SubscriptionUpsert) -> StoreResult<UpsertOutcome> {
        let mut tables = self.inner.write();
        match tables.subscriptions.get_mut(&upsert.stripe_subscription_id) {
            Some(existing) => {
                if existing.updated_at >= upsert.event_time {
                    return Ok(UpsertOutcome::Stale);
                }
                existing.status = upsert.status;
                existing.current_period_start = upsert.current_period_start;
                existing.current_period_end = upsert.current_period_end;
                existing.cancel_at_period_end = upsert.cancel_at_period_end;
                existing.updated_at = upsert.event_time;
                Ok(UpsertOutcome::Updated)
            }
            None => {
                let record = SubscriptionRecord {
                    id: Uuid::new_v4(),
                    user_id: upsert.user_id,
                    stripe_subscription_id: upsert.stripe_subscription_id.clone(),
                    status: upsert.status,
                    current_period_start: upsert.current_period_start,
                    current_period_end: upsert.current_period_end,
                    cancel_at_period_end: upsert.cancel_at_period_end,
                    created_at: upsert.event_time,
                    updated_at: upsert.event_time,
                };
                tables
                    .subscriptions
                    .insert(record.stripe_subscription_id.clone(), record);
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    async fn update_subscription_if_newer(
        &self,
        stripe_subscription_id: &str,
        change: SubscriptionChange,
    ) -> StoreResult<UpdateOutcome> {
        let mut tables = self.inner.write();
        match tables.subscriptions.get_mut(stripe_subscription_id) {
            Some(existing) => {
                if existing.updated_at >= change.event_time {
                    return Ok(UpdateOutcome::Stale);
                }
                existing.status = change.status;
                existing.current_period_start = change.current_period_start;
                existing.current_period_end = change.current_period_end;
                existing.cancel_at_period_end = change.cancel_at_period_end;
                existing.updated_at = change.event_time;
                Ok(UpdateOutcome::Applied)
            }
            None => Ok(UpdateOutcome::NotFound),
        }
    }

    async fn record_purchase(&self, purchase: NewPurchase) -> StoreResult<InsertOutcome> {
        let mut tables = self.inner.write();
        if tables.purchases.contains_key(&purchase.stripe_checkout_id) {
            return Ok(InsertOutcome::Duplicate);
        }
        let record = PurchaseRecord {
            id: Uuid::new_v4(),
            user_id: purchase.user_id,
            stripe_checkout_id: purchase.stripe_checkout_id.clone(),
            stripe_payment_intent_id: purchase.stripe_payment_intent_id,
            stripe_price_id: purchase.stripe_price_id,
            amount: purchase.amount,
            currency: purchase.currency,
            status: purchase.status,
            created_at: purchase.event_time,
            updated_at: purchase.event_time,
        };
        tables
            .purchases
            .insert(record.stripe_checkout_id.clone(), record);
        Ok(InsertOutcome::Inserted)
    }
}
