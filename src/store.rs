//! Where finished videos end up. Uploading is best effort: any failure leaves the caller with the
//! local path.

use std::{path::Path, time::Duration};

use anyhow::Context as _;
use async_trait::async_trait;

use crate::config::StoreConfig;
use crate::foundation::error::{ReelError, ReelResult};

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    fn name(&self) -> &str;

    /// Store `local` as `object_name` and return a durable reference to it.
    async fn put(&self, local: &Path, object_name: &str) -> ReelResult<String>;
}

/// Keeps files where they are; the reference is the local path.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalStore;

#[async_trait]
impl ArtifactStore for LocalStore {
    fn name(&self) -> &str {
        "local"
    }

    async fn put(&self, local: &Path, _object_name: &str) -> ReelResult<String> {
        if !tokio::fs::try_exists(local).await.unwrap_or(false) {
            return Err(ReelError::upload(format!("'{}' does not exist", local.display())));
        }
        Ok(local.display().to_string())
    }
}

/// Object storage REST API (`/storage/v1/object/{bucket}/{name}`).
#[derive(Clone, Debug)]
pub struct HttpStore {
    http: reqwest::Client,
    base_url: String,
    key: String,
    bucket: String,
}

impl HttpStore {
    /// `None` when the store is not configured.
    pub fn from_config(cfg: &StoreConfig) -> ReelResult<Option<Self>> {
        let (Some(url), Some(key)) = (cfg.url.as_deref(), cfg.key.as_deref()) else {
            return Ok(None);
        };
        Self::new(url, key, &cfg.bucket).map(Some)
    }

    pub fn new(base_url: &str, key: &str, bucket: &str) -> ReelResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .context("failed to build storage http client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            key: key.to_owned(),
            bucket: bucket.to_owned(),
        })
    }

    pub fn object_url(&self, object_name: &str) -> String {
        format!(
            "{}/storage/v1/object/{}/{object_name}",
            self.base_url, self.bucket
        )
    }

    pub fn public_url(&self, object_name: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{object_name}",
            self.base_url, self.bucket
        )
    }
}

#[async_trait]
impl ArtifactStore for HttpStore {
    fn name(&self) -> &str {
        "http"
    }

    #[tracing::instrument(skip(self), fields(bucket = %self.bucket))]
    async fn put(&self, local: &Path, object_name: &str) -> ReelResult<String> {
        let body = tokio::fs::read(local)
            .await
            .with_context(|| format!("failed to read '{}'", local.display()))?;
        let resp = self
            .http
            .post(self.object_url(object_name))
            .bearer_auth(&self.key)
            .header("apikey", &self.key)
            .header(reqwest::header::CONTENT_TYPE, "video/mp4")
            .header("x-upsert", "true")
            .body(body)
            .send()
            .await
            .map_err(|e| ReelError::upload(format!("request failed: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ReelError::upload(format!("{status} - {}", text.trim())));
        }
        Ok(self.public_url(object_name))
    }
}

/// Upload through `store` when there is one. Any failure falls back to the local path.
pub async fn publish(store: Option<&dyn ArtifactStore>, local: &Path, object_name: &str) -> String {
    let fallback = local.display().to_string();
    let Some(store) = store else {
        return fallback;
    };
    match store.put(local, object_name).await {
        Ok(url) => {
            tracing::info!(store = store.name(), %url, "video published");
            url
        }
        Err(err) => {
            tracing::warn!(store = store.name(), %err, "upload failed, keeping local path");
            fallback
        }
    }
}
