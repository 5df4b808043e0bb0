//! Release storage boundary.
//!
//! The downloadable app binary lives in an object store; the download
//! handler only ever hands out short-lived signed URLs, never the object
//! itself.

use thiserror::Error;

/// Errors from the storage boundary.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The storage service could not be reached.
    #[error("storage request failed: {0}")]
    Request(String),

    /// The storage service refused to sign the URL.
    #[error("failed to sign download URL: {0}")]
    SignFailed(String),
}

/// Mints time-limited download URLs for release artifacts.
#[async_trait::async_trait]
pub trait ReleaseStorage: Send + Sync + 'static {
    /// Produce a signed URL for `object_path`, valid for `expires_in_secs`.
    async fn signed_url(
        &self,
        object_path: &str,
        expires_in_secs: u64,
    ) -> Result<String, StorageError>;
}

/// Storage client speaking the Supabase storage REST convention.
#[derive(Debug, Clone)]
pub struct RestStorage {
    http: reqwest::Client,
    base_url: String,
    service_key: String,
    bucket: String,
}

#[derive(Debug, serde::Deserialize)]
struct SignResponse {
    #[serde(rename = "signedURL")]
    signed_url: String,
}

impl RestStorage {
    /// Build a storage client for one bucket.
    pub fn new(base_url: &str, service_key: &str, bucket: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key: service_key.to_string(),
            bucket: bucket.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl ReleaseStorage for RestStorage {
    async fn signed_url(
        &self,
        object_path: &str,
        expires_in_secs: u64,
    ) -> Result<String, StorageError> {
        let endpoint = format!(
            "{}/storage/v1/object/sign/{}/{}",
            self.base_url, self.bucket, object_path
        );
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(&self.service_key)
            .json(&serde_json::json!({"expiresIn": expires_in_secs}))
            .send()
            .await
            .map_err(|e| StorageError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(StorageError::SignFailed(format!(
                "storage endpoint answered {}",
                response.status()
            )));
        }

        let sign: SignResponse = response
            .json()
            .await
            .map_err(|e| StorageError::SignFailed(e.to_string()))?;

        // The endpoint answers with a project-relative path.
        Ok(format!(
            "{}/storage/v1{}",
            self.base_url,
            sign.signed_url.trim_start_matches("/storage/v1")
        ))
    }
}

/// Fixed-URL storage for tests and local runs.
#[derive(Debug, Clone)]
pub struct StaticStorage {
    base_url: String,
}

impl StaticStorage {
    /// Storage rooted at a fixed URL.
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait::async_trait]
impl ReleaseStorage for StaticStorage {
    async fn signed_url(
        &self,
        object_path: &str,
        expires_in_secs: u64,
    ) -> Result<String, StorageError> {
        Ok(format!(
            "{}/{object_path}?expires_in={expires_in_secs}",
            self.base_url
        ))
    }
}
