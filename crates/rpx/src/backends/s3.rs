//! 🪣 S3 object store: `PutObject` plus a pre-signed `GetObject`.
//!
//! 🧠 Knowledge graph:
//! - One SDK client per configured bucket, built once at start-up. Buckets may
//!   live in different regions and may carry their own access key pair.
//! - No explicit keys → the ambient AWS chain (env vars → ~/.aws → IAM role → hope).
//! - Signing is local; the URL is credential-less for whoever holds it, until it expires.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use serde::Deserialize;
use tracing::debug;

use super::ObjectStore;
use crate::app_config::Secret;
use crate::common::ReportVariant;
use crate::store::StorageConfig;

/// 🪣 Where one report variant's PDFs go.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct BucketConfig {
    pub bucket: String,
    /// 🌍 Falls back to `storage.region`.
    #[serde(default)]
    pub region: Option<String>,
    /// 🏷️ Object key prefix. Falls back to the variant's default prefix.
    #[serde(default)]
    pub key_prefix: Option<String>,
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<Secret>,
}

impl BucketConfig {
    pub fn named(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            region: None,
            key_prefix: None,
            access_key_id: None,
            secret_access_key: None,
        }
    }
}

/// 🔑 What makes two bucket entries the same client.
#[derive(PartialEq)]
struct BucketIdentity {
    region: String,
    credentials: Option<(String, Secret)>,
}

#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    clients: HashMap<String, aws_sdk_s3::Client>,
}

impl S3ObjectStore {
    /// 🚀 Builds one client per configured bucket.
    ///
    /// Variants may share a bucket only if they agree on its region and keys.
    /// Two different identities for one bucket name is a config error.
    pub async fn from_config(config: &StorageConfig) -> Result<Self> {
        let mut clients = HashMap::new();
        let mut owners: HashMap<&str, (ReportVariant, BucketIdentity)> = HashMap::new();
        // -- sorted so the error names the same pair of variants on every run
        let mut entries: Vec<_> = config.buckets.iter().collect();
        entries.sort_by_key(|(variant, _)| **variant);

        for (variant, bucket) in entries {
            let region = bucket.region.clone().unwrap_or_else(|| config.region.clone());
            let credentials = match (&bucket.access_key_id, &bucket.secret_access_key) {
                (Some(key_id), Some(secret)) => Some((key_id.clone(), secret.clone())),
                (None, None) => None,
                _ => anyhow::bail!(
                    "💀 storage.buckets.{variant}: access_key_id and secret_access_key come as a pair. One without the other is a locked door with no key."
                ),
            };

            let identity = BucketIdentity {
                region: region.clone(),
                credentials: credentials.clone(),
            };
            if let Some((owner, owner_identity)) = owners.get(bucket.bucket.as_str()) {
                if *owner_identity != identity {
                    anyhow::bail!(
                        "💀 storage.buckets.{owner} and storage.buckets.{variant} both use bucket '{}' with a different region or key pair. Pick one.",
                        bucket.bucket
                    );
                }
                debug!("🪣 {variant} reports share s3://{} with {owner}", bucket.bucket);
                continue;
            }
            owners.insert(bucket.bucket.as_str(), (*variant, identity));

            let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(Region::new(region.clone()));
            if let Some((key_id, secret)) = credentials {
                loader = loader.credentials_provider(Credentials::new(
                    key_id,
                    secret.expose().to_string(),
                    None,
                    None,
                    "rpx-config",
                ));
            }
            let sdk_config = loader.load().await;
            debug!("🪣 {variant} reports go to s3://{} in {region}", bucket.bucket);
            clients.insert(bucket.bucket.clone(), aws_sdk_s3::Client::new(&sdk_config));
        }
        Ok(Self { clients })
    }

    fn client(&self, bucket: &str) -> Result<&aws_sdk_s3::Client> {
        self.clients
            .get(bucket)
            .ok_or_else(|| anyhow!("💀 No S3 client was configured for bucket '{bucket}'"))
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<()> {
        self.client(bucket)?
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type("application/pdf")
            .body(ByteStream::from(body))
            .send()
            .await
            .with_context(|| {
                format!("💀 PutObject failed for s3://{bucket}/{key}. Check the bucket name, region and credentials.")
            })?;
        Ok(())
    }

    async fn presign_get(&self, bucket: &str, key: &str, expires_in: Duration) -> Result<String> {
        let presigning = PresigningConfig::expires_in(expires_in)
            .with_context(|| format!("💀 The object store rejected an expiry of {}s", expires_in.as_secs()))?;
        let request = self
            .client(bucket)?
            .get_object()
            .bucket(bucket)
            .key(key)
            .presigned(presigning)
            .await
            .with_context(|| format!("💀 Could not sign a download link for s3://{bucket}/{key}"))?;
        Ok(request.uri().to_string())
    }
}
