//! Entitlement-gated download endpoint.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::Redirect;
use http::HeaderMap;
use serde::Deserialize;

use super::AppState;
use crate::auth::resolve_principal;
use crate::error::{Error, Result};

/// Query parameters for `GET /api/download`.
#[derive(Debug, Deserialize)]
pub struct DownloadParams {
    /// Target platform; only `mac` ships today.
    pub platform: Option<String>,
}

/// Hand out a short-lived signed URL for the app binary.
///
/// The binary itself never passes through this server; the handler checks
/// the entitlement flag and redirects to a URL the storage service signed.
///
/// # Route
/// `GET /api/download?platform=mac`
pub async fn download_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DownloadParams>,
    headers: HeaderMap,
) -> Result<Redirect> {
    let principal = resolve_principal(&headers, state.identity.as_ref()).await?;

    let platform = params.platform.as_deref().unwrap_or("mac");
    if platform != "mac" {
        return Err(Error::BadRequest(
            "Only macOS is currently supported".to_string(),
        ));
    }

    let entitled = state
        .store
        .profile(principal.user_id)
        .await?
        .map(|profile| profile.has_active_subscription)
        .unwrap_or(false);
    if !entitled {
        return Err(Error::Forbidden(
            "Active subscription required".to_string(),
        ));
    }

    let url = state
        .storage
        .signed_url(&state.config.mac_app_path, state.config.download_ttl_secs)
        .await?;

    tracing::info!(user_id = %principal.user_id, "issued download link");
    Ok(Redirect::temporary(&url))
}
