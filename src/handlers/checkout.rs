//! Checkout-session endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use http::HeaderMap;
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::auth::resolve_principal;
use crate::billing::CheckoutRequest;
use crate::error::{Error, Result};

/// Request body for `POST /api/create-checkout-session`.
#[derive(Debug, Deserialize)]
pub struct CheckoutBody {
    /// Email to check out with; must match the authenticated principal.
    #[serde(default)]
    pub email: Option<String>,
}

/// Response body: the hosted checkout URL to redirect to.
#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    /// Hosted checkout URL.
    pub url: String,
}

/// Start a subscription checkout for the authenticated user.
///
/// The email in the body must match the principal's - checkout sessions are
/// never created on someone else's behalf. The email also rides along as
/// metadata so the completed-checkout event can be resolved back to the
/// user.
///
/// # Route
/// `POST /api/create-checkout-session`
pub async fn checkout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Option<Json<CheckoutBody>>,
) -> Result<Json<CheckoutResponse>> {
    let principal = resolve_principal(&headers, state.identity.as_ref()).await?;

    let email = body
        .and_then(|Json(body)| body.email)
        .ok_or_else(|| Error::BadRequest("Email is required".to_string()))?;

    if email != principal.email {
        return Err(Error::Forbidden(
            "Email does not match authenticated user".to_string(),
        ));
    }

    let created = state
        .gateway
        .create_checkout_session(CheckoutRequest {
            customer_email: email,
        })
        .await?;

    Ok(Json(CheckoutResponse { url: created.url }))
}
