//! Authenticated profile endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use http::HeaderMap;
use serde::Serialize;
use uuid::Uuid;

use super::AppState;
use crate::auth::resolve_principal;
use crate::error::Result;
use crate::store::{NewProfile, SubscriptionRecord};

/// Response body for `GET /api/user`.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    /// User id.
    pub id: Uuid,
    /// Email on record.
    pub email: String,
    /// Display name, if any.
    pub username: Option<String>,
    /// Derived entitlement flag.
    pub has_active_subscription: bool,
    /// The live subscription row, if one exists.
    pub subscription: Option<SubscriptionRecord>,
    /// Account creation time, per the identity provider.
    pub created_at: Option<DateTime<Utc>>,
}

/// Profile fetch with lazy creation.
///
/// The profile row mirrors the identity-provider user; if this is the
/// user's first authenticated access, the mirror is created here.
///
/// # Route
/// `GET /api/user`
pub async fn user_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<UserResponse>> {
    let principal = resolve_principal(&headers, state.identity.as_ref()).await?;

    let profile = match state.store.profile(principal.user_id).await? {
        Some(profile) => profile,
        None => {
            tracing::info!(user_id = %principal.user_id, "creating profile on first access");
            state
                .store
                .create_profile(NewProfile {
                    id: principal.user_id,
                    email: principal.email.clone(),
                    username: principal.username.clone(),
                })
                .await?
        }
    };

    let subscription = state
        .store
        .active_subscription_for_user(principal.user_id)
        .await?;

    Ok(Json(UserResponse {
        id: profile.id,
        email: profile.email,
        username: profile.username.or(principal.username),
        has_active_subscription: profile.has_active_subscription,
        subscription,
        created_at: principal.created_at,
    }))
}
