//! Entitlement store writer.
//!
//! Applies a classified intent to the profile/subscription/purchase rows.
//! Two properties carry the whole concurrency story (there is no locking
//! anywhere else):
//!
//! - **Idempotency**: every write is an upsert or insert keyed on the
//!   processor-assigned external id. Redelivering an event produces the
//!   same end state and never a duplicate row.
//! - **Ordering**: subscription writes carry the event's creation time and
//!   the store skips any write that is not newer than the row's
//!   `updated_at`. Two deliveries racing in either order converge on the
//!   chronologically-latest state.
//!
//! The profile's `has_active_subscription` flag is derived: after a
//! subscription write lands, it is recomputed from the subscription rows
//! rather than toggled from the event, so a user with a second live
//! subscription keeps their entitlement when the first one is canceled.

use uuid::Uuid;

use crate::billing::classifier::Intent;
use crate::billing::client::PaymentGateway;
use crate::billing::error::{WebhookError, WebhookResult, WriteError};
use crate::billing::events::{CheckoutSession, Subscription, SubscriptionStatus, WebhookEvent};
use crate::store::{
    EntitlementStore, InsertOutcome, NewPurchase, SubscriptionChange, SubscriptionUpsert,
    UpdateOutcome, UpsertOutcome,
};

/// What applying an intent did to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyResult {
    /// Subscription row written and profile entitlement recomputed.
    SubscriptionSynced {
        /// External subscription id.
        subscription_id: String,
        /// Status now stored.
        status: SubscriptionStatus,
        /// Entitlement flag after recomputation.
        entitled: bool,
    },

    /// The stored row already reflects a newer event; nothing written.
    SubscriptionStale {
        /// External subscription id.
        subscription_id: String,
    },

    /// Purchase row appended.
    PurchaseRecorded {
        /// External checkout id.
        checkout_id: String,
    },

    /// Purchase row already existed; nothing written.
    PurchaseDuplicate {
        /// External checkout id.
        checkout_id: String,
    },
}

impl ApplyResult {
    /// Short name for structured logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SubscriptionSynced { .. } => "subscription_synced",
            Self::SubscriptionStale { .. } => "subscription_stale",
            Self::PurchaseRecorded { .. } => "purchase_recorded",
            Self::PurchaseDuplicate { .. } => "purchase_duplicate",
        }
    }
}

/// Apply an intent for the resolved user.
pub async fn apply(
    store: &dyn EntitlementStore,
    gateway: &dyn PaymentGateway,
    intent: &Intent,
    user_id: Uuid,
    event: &WebhookEvent,
) -> WebhookResult<ApplyResult> {
    match intent {
        Intent::CreateOrUpdateSubscription { checkout } => {
            establish_subscription(store, gateway, checkout, user_id, event).await
        }
        Intent::UpdateSubscriptionStatus {
            subscription,
            forced_status,
        } => update_subscription(store, subscription, *forced_status, user_id, event).await,
        Intent::RecordPurchase { checkout } => record_purchase(store, checkout, user_id, event).await,
        Intent::Ignore { .. } => unreachable!("ignored events are acknowledged before apply"),
    }
}

/// Checkout-completed (subscription mode): upsert the subscription row,
/// record the billing customer id, and recompute the entitlement.
async fn establish_subscription(
    store: &dyn EntitlementStore,
    gateway: &dyn PaymentGateway,
    checkout: &CheckoutSession,
    user_id: Uuid,
    event: &WebhookEvent,
) -> WebhookResult<ApplyResult> {
    let subscription_id = checkout.subscription.as_deref().ok_or_else(|| {
        WebhookError::InvalidPayload(
            "subscription-mode checkout session carries no subscription id".to_string(),
        )
    })?;

    // The checkout event carries only the subscription id; status and
    // period come from the processor.
    let subscription = gateway
        .retrieve_subscription(subscription_id)
        .await
        .map_err(|e| WebhookError::Gateway(e.to_string()))?;

    let event_time = event.created_at();
    let outcome = store
        .upsert_subscription(SubscriptionUpsert {
            user_id,
            stripe_subscription_id: subscription.id.clone(),
            status: subscription.status,
            current_period_start: subscription.period_start(),
            current_period_end: subscription.period_end(),
            cancel_at_period_end: subscription.cancel_at_period_end,
            event_time,
        })
        .await
        .map_err(WriteError::Store)?;

    if outcome == UpsertOutcome::Stale {
        return Ok(ApplyResult::SubscriptionStale {
            subscription_id: subscription.id,
        });
    }

    let entitled = recompute_entitlement(store, user_id).await?;
    let touched = store
        .set_entitlement(user_id, entitled, checkout.customer.clone(), event_time)
        .await
        .map_err(WriteError::Store)?;
    if !touched {
        return Err(WriteError::ProfileNotFound(user_id).into());
    }

    Ok(ApplyResult::SubscriptionSynced {
        subscription_id: subscription.id,
        status: subscription.status,
        entitled,
    })
}

/// Subscription updated/deleted: update the matched row, then recompute the
/// owning profile's entitlement.
async fn update_subscription(
    store: &dyn EntitlementStore,
    subscription: &Subscription,
    forced_status: Option<SubscriptionStatus>,
    user_id: Uuid,
    event: &WebhookEvent,
) -> WebhookResult<ApplyResult> {
    let status = forced_status.unwrap_or(subscription.status);
    let event_time = event.created_at();

    let outcome = store
        .update_subscription_if_newer(
            &subscription.id,
            SubscriptionChange {
                status,
                current_period_start: subscription.period_start(),
                current_period_end: subscription.period_end(),
                cancel_at_period_end: subscription.cancel_at_period_end,
                event_time,
            },
        )
        .await
        .map_err(WriteError::Store)?;

    match outcome {
        UpdateOutcome::NotFound => {
            Err(WriteError::SubscriptionNotFound(subscription.id.clone()).into())
        }
        UpdateOutcome::Stale => Ok(ApplyResult::SubscriptionStale {
            subscription_id: subscription.id.clone(),
        }),
        UpdateOutcome::Applied => {
            let entitled = recompute_entitlement(store, user_id).await?;
            let touched = store
                .set_entitlement(user_id, entitled, None, event_time)
                .await
                .map_err(WriteError::Store)?;
            if !touched {
                return Err(WriteError::ProfileNotFound(user_id).into());
            }
            Ok(ApplyResult::SubscriptionSynced {
                subscription_id: subscription.id.clone(),
                status,
                entitled,
            })
        }
    }
}

/// One-time checkout: append-only audit record, keyed by checkout id.
/// Never touches the entitlement flag.
async fn record_purchase(
    store: &dyn EntitlementStore,
    checkout: &CheckoutSession,
    user_id: Uuid,
    event: &WebhookEvent,
) -> WebhookResult<ApplyResult> {
    let outcome = store
        .record_purchase(NewPurchase {
            user_id,
            stripe_checkout_id: checkout.id.clone(),
            stripe_payment_intent_id: checkout.payment_intent.clone(),
            stripe_price_id: None,
            amount: checkout.amount_total.unwrap_or_default(),
            currency: checkout
                .currency
                .clone()
                .unwrap_or_else(|| "usd".to_string()),
            status: checkout
                .payment_status
                .clone()
                .unwrap_or_else(|| "completed".to_string()),
            event_time: event.created_at(),
        })
        .await
        .map_err(WriteError::Store)?;

    Ok(match outcome {
        InsertOutcome::Inserted => ApplyResult::PurchaseRecorded {
            checkout_id: checkout.id.clone(),
        },
        InsertOutcome::Duplicate => ApplyResult::PurchaseDuplicate {
            checkout_id: checkout.id.clone(),
        },
    })
}

/// Entitlement is derived: true iff at least one subscription row is in an
/// entitled status right now.
async fn recompute_entitlement(
    store: &dyn EntitlementStore,
    user_id: Uuid,
) -> WebhookResult<bool> {
    Ok(store
        .active_subscription_for_user(user_id)
        .await
        .map_err(WriteError::Store)?
        .is_some())
}
