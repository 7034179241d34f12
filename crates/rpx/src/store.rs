//! 🗄️ Artifact store: local PDF → bucket → signed URL → local file gone.
//!
//! 🧠 Knowledge graph:
//! - Bucket per variant from `storage.buckets`. No bucket → [`StoreError::UnknownBucket`].
//! - Key `{key_prefix}-{job_id}.pdf`. Same job, same key, re-uploads overwrite.
//! - Upload is awaited before signing. No signed URL ever points at a failed upload.
//! - Expiry is capped at one week. Over the cap is an error, never a quiet truncation.
//! - Local cleanup failure is a `warn!`. The URL still goes out.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::backends::ObjectStore;
use crate::backends::s3::BucketConfig;
use crate::common::ReportVariant;

/// ⏳ The longest a SigV4 pre-signed URL may live.
pub const MAX_SIGNED_URL_EXPIRY: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// 🌍 Default region for buckets that don't name one.
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_signed_url_expiry_secs")]
    pub signed_url_expiry_secs: u64,
    #[serde(default = "default_buckets")]
    pub buckets: HashMap<ReportVariant, BucketConfig>,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_signed_url_expiry_secs() -> u64 {
    MAX_SIGNED_URL_EXPIRY.as_secs()
}

fn default_buckets() -> HashMap<ReportVariant, BucketConfig> {
    HashMap::from([(
        ReportVariant::Adult,
        BucketConfig::named("psp-mindset-assessment-reports"),
    )])
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            signed_url_expiry_secs: default_signed_url_expiry_secs(),
            buckets: default_buckets(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("💀 no bucket is configured for {0} reports (storage.buckets.{0})")]
    UnknownBucket(ReportVariant),
    #[error("💀 a signed URL expiry of {0}s exceeds the one-week maximum")]
    ExpiryTooLong(u64),
    #[error("💀 could not read the rendered report at {path}")]
    ReadLocal {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("💀 upload of {key} failed: {source:#}")]
    Upload {
        key: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("💀 signing a download link for {key} failed: {source:#}")]
    Signing {
        key: String,
        #[source]
        source: anyhow::Error,
    },
}

/// 🏷️ `{key_prefix}-{job_id}.pdf`
pub fn object_key(variant: ReportVariant, bucket: &BucketConfig, job_id: &str) -> String {
    let prefix = bucket
        .key_prefix
        .as_deref()
        .unwrap_or_else(|| variant.default_key_prefix());
    format!("{prefix}-{job_id}.pdf")
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    objects: Arc<dyn ObjectStore>,
    config: StorageConfig,
}

impl ArtifactStore {
    pub fn new(objects: Arc<dyn ObjectStore>, config: StorageConfig) -> Self {
        Self { objects, config }
    }

    /// 📤 Upload, sign, clean up. Returns the signed URL.
    pub async fn store(
        &self,
        variant: ReportVariant,
        job_id: &str,
        local_path: &Path,
    ) -> Result<String, StoreError> {
        let expiry_secs = self.config.signed_url_expiry_secs;
        let expiry = Duration::from_secs(expiry_secs);
        if expiry > MAX_SIGNED_URL_EXPIRY {
            return Err(StoreError::ExpiryTooLong(expiry_secs));
        }
        let bucket = self
            .config
            .buckets
            .get(&variant)
            .ok_or(StoreError::UnknownBucket(variant))?;
        let key = object_key(variant, bucket, job_id);

        let body = tokio::fs::read(local_path)
            .await
            .map_err(|source| StoreError::ReadLocal {
                path: local_path.to_path_buf(),
                source,
            })?;
        debug!("📤 uploading {} bytes to s3://{}/{key}", body.len(), bucket.bucket);
        self.objects
            .put_object(&bucket.bucket, &key, body)
            .await
            .map_err(|source| StoreError::Upload {
                key: key.clone(),
                source,
            })?;

        let url = self
            .objects
            .presign_get(&bucket.bucket, &key, expiry)
            .await
            .map_err(|source| StoreError::Signing {
                key: key.clone(),
                source,
            })?;
        info!("🪣 report stored as s3://{}/{key}", bucket.bucket);

        if let Err(err) = tokio::fs::remove_file(local_path).await {
            warn!(
                "⚠️ uploaded {key} but could not delete the local copy {}: {err}",
                local_path.display()
            );
        }
        Ok(url)
    }
}
