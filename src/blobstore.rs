//! Access to the hosted object storage holding request recordings.  Absence
//! is a recoverable outcome for both resolve and delete.

use crate::error::AppError;
use crate::utils::{access_token, percent_encode, GcpAuthenticator};

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::error;

const STORAGE_SCOPE: &str = "https://www.googleapis.com/auth/devstorage.read_write";
const RECORDING_CONTENT_TYPE: &str = "audio/wav";

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(&self, name: &str, bytes: Vec<u8>) -> Result<(), AppError>;
    /// Retrieval URL for an object, or `None` when it does not exist.
    async fn resolve(&self, name: &str) -> Result<Option<String>, AppError>;
    /// Delete an object; a missing object counts as success.
    async fn delete(&self, name: &str) -> Result<(), AppError>;
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ObjectMeta {
    media_link: String,
}

pub struct GcsBlobStore {
    http: reqwest::Client,
    auth: Arc<GcpAuthenticator>,
    bucket: String,
}

impl GcsBlobStore {
    pub fn new(http: reqwest::Client, auth: Arc<GcpAuthenticator>, bucket: String) -> Self {
        Self { http, auth, bucket }
    }

    fn object_url(&self, name: &str) -> String {
        format!(
            "https://storage.googleapis.com/storage/v1/b/{}/o/{}",
            self.bucket,
            percent_encode(name)
        )
    }

    async fn bearer(&self) -> Result<String, AppError> {
        access_token(&self.auth, &[STORAGE_SCOPE]).await
    }
}

#[async_trait]
impl BlobStore for GcsBlobStore {
    async fn upload(&self, name: &str, bytes: Vec<u8>) -> Result<(), AppError> {
        let url = format!(
            "https://storage.googleapis.com/upload/storage/v1/b/{}/o?uploadType=media&name={}",
            self.bucket,
            percent_encode(name)
        );
        let resp = self
            .http
            .post(&url)
            .bearer_auth(self.bearer().await?)
            .header(reqwest::header::CONTENT_TYPE, RECORDING_CONTENT_TYPE)
            .body(bytes)
            .send()
            .await
            .map_err(|e| {
                error!(error=%e, name, "recording upload failed");
                AppError("recording upload failed")
            })?;
        if !resp.status().is_success() {
            error!(status=%resp.status(), name, "recording upload rejected");
            return Err(AppError("recording upload rejected"));
        }
        Ok(())
    }

    async fn resolve(&self, name: &str) -> Result<Option<String>, AppError> {
        let resp = self
            .http
            .get(&self.object_url(name))
            .bearer_auth(self.bearer().await?)
            .send()
            .await
            .map_err(|e| {
                error!(error=%e, name, "recording lookup failed");
                AppError("recording lookup failed")
            })?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            error!(status=%resp.status(), name, "recording lookup rejected");
            return Err(AppError("recording lookup rejected"));
        }
        let meta: ObjectMeta = resp.json().await.map_err(|e| {
            error!(error=%e, name, "failed to decode object metadata");
            AppError("object metadata decode failed")
        })?;
        Ok(Some(meta.media_link))
    }

    async fn delete(&self, name: &str) -> Result<(), AppError> {
        let resp = self
            .http
            .delete(&self.object_url(name))
            .bearer_auth(self.bearer().await?)
            .send()
            .await
            .map_err(|e| {
                error!(error=%e, name, "recording delete failed");
                AppError("recording delete failed")
            })?;
        // Not found means there was nothing to delete.
        if resp.status() == reqwest::StatusCode::NOT_FOUND || resp.status().is_success() {
            return Ok(());
        }
        error!(status=%resp.status(), name, "recording delete rejected");
        Err(AppError("recording delete rejected"))
    }
}
