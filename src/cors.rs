//! CORS (Cross-Origin Resource Sharing) Configuration
//!
//! The API is consumed by the web frontend on the public site and, during
//! development, by a localhost dev server. The CORS layer admits exactly
//! the configured origins - nothing else, including other private-range
//! hosts.
//!
//! # Policy
//!
//! - **Allowed Origins**: the configured list (public site + localhost dev)
//! - **Allowed Methods**: GET, POST, OPTIONS (preflight)
//! - **Allowed Headers**: Content-Type, Authorization
//! - **Max Age**: 3600 seconds (1 hour) for preflight caching

use std::time::Duration;

use http::{header::HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};

/// Standard allowed headers for the API
pub const ALLOWED_HEADERS: [http::header::HeaderName; 2] =
    [http::header::CONTENT_TYPE, http::header::AUTHORIZATION];

/// Standard allowed methods for the API
pub const ALLOWED_METHODS: [Method; 3] = [Method::GET, Method::POST, Method::OPTIONS];

/// Default max age for preflight cache (1 hour)
pub const DEFAULT_MAX_AGE_SECS: u64 = 3600;

/// Creates a CORS layer admitting exactly the given origins.
///
/// Origins are compared byte-for-byte against the `Origin` header, so
/// entries must be scheme + host (+ port), no trailing slash.
pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(ALLOWED_METHODS)
        .allow_headers(ALLOWED_HEADERS)
        .max_age(Duration::from_secs(DEFAULT_MAX_AGE_SECS))
}
