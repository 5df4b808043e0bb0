//! Identity resolution.
//!
//! Maps event-supplied identifying information onto an internal user id.
//! Checkout events resolve by email; subscription lifecycle events resolve
//! through the subscription row they reference. Resolution reads only -
//! every write belongs to the writer.

use uuid::Uuid;

use crate::billing::classifier::Intent;
use crate::billing::error::{ResolutionError, WebhookResult, WriteError};
use crate::billing::events::CheckoutSession;
use crate::store::EntitlementStore;

/// Resolve the internal user an intent applies to.
///
/// `Ignore` intents never reach this function; the reconciler short-circuits
/// them before resolution.
pub async fn resolve(store: &dyn EntitlementStore, intent: &Intent) -> WebhookResult<Uuid> {
    match intent {
        Intent::CreateOrUpdateSubscription { checkout } | Intent::RecordPurchase { checkout } => {
            resolve_by_email(store, checkout).await
        }
        Intent::UpdateSubscriptionStatus { subscription, .. } => {
            let row = store
                .subscription_by_external_id(&subscription.id)
                .await
                .map_err(WriteError::Store)?;
            match row {
                Some(row) => Ok(row.user_id),
                // The update event lacks creation data (price, period), so
                // an unknown id is an error, never an insert.
                None => Err(ResolutionError::SubscriptionNotFound(subscription.id.clone()).into()),
            }
        }
        Intent::Ignore { .. } => unreachable!("ignored events are acknowledged before resolution"),
    }
}

/// Look a user up by the email the checkout event carries.
///
/// The metadata email (attached by our own checkout endpoint) wins; the
/// processor's customer-level email field is the fallback. Exactly one
/// profile must match.
async fn resolve_by_email(
    store: &dyn EntitlementStore,
    checkout: &CheckoutSession,
) -> WebhookResult<Uuid> {
    let email = checkout
        .metadata_email()
        .or(checkout.customer_email.as_deref())
        .ok_or(ResolutionError::MissingEmail)?;

    let mut matches = store
        .profiles_by_email(email)
        .await
        .map_err(WriteError::Store)?;

    match matches.len() {
        0 => Err(ResolutionError::UserNotFound {
            email: email.to_string(),
        }
        .into()),
        1 => Ok(matches.remove(0).id),
        count => Err(ResolutionError::AmbiguousUser {
            email: email.to_string(),
            count,
        }
        .into()),
    }
}
