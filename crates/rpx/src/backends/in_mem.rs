//! 🧪 In-memory understudies for every backend seam.
//!
//! Each one records what it was asked to do in an `Arc<tokio::sync::Mutex<Vec<_>>>`
//! so tests can hand the backend to the pipeline and still peek inside
//! afterwards. Each one can be told to fail. None of them touch the network.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use super::{ChatSink, EmailMessage, Mailer, ObjectStore, ReportRenderer, SurveyPlatform};
use crate::render::{RenderError, RenderJob};

/// 📋 A survey platform that answers from a HashMap keyed by response id.
#[derive(Debug, Default, Clone)]
pub struct InMemorySurveyPlatform {
    pub responses: Arc<Mutex<HashMap<String, Value>>>,
    /// 🔍 Every `(survey_id, response_id)` we were asked for.
    pub fetched: Arc<Mutex<Vec<(String, String)>>>,
}

impl InMemorySurveyPlatform {
    pub async fn with_response(self, response_id: &str, body: Value) -> Self {
        self.responses.lock().await.insert(response_id.to_string(), body);
        self
    }
}

#[async_trait]
impl SurveyPlatform for InMemorySurveyPlatform {
    async fn fetch_response(&self, survey_id: &str, response_id: &str) -> Result<Value> {
        self.fetched
            .lock()
            .await
            .push((survey_id.to_string(), response_id.to_string()));
        self.responses
            .lock()
            .await
            .get(response_id)
            .cloned()
            .ok_or_else(|| anyhow!("💀 404: no response {response_id} in survey {survey_id}"))
    }
}

/// 🖨️ A renderer that writes a tiny fake PDF whose body is the job URL.
/// Reading the file back tells you exactly which job produced it.
#[derive(Debug, Clone)]
pub struct InMemoryRenderer {
    output_dir: PathBuf,
    pub jobs: Arc<Mutex<Vec<RenderJob>>>,
    pub fail: Arc<AtomicBool>,
    /// 🐢 Simulated print time, for the concurrency tests.
    pub delay: Duration,
}

impl InMemoryRenderer {
    pub fn new(output_dir: impl AsRef<Path>) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            jobs: Arc::default(),
            fail: Arc::default(),
            delay: Duration::ZERO,
        }
    }

    pub fn failing(self) -> Self {
        self.fail.store(true, Ordering::SeqCst);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl ReportRenderer for InMemoryRenderer {
    async fn render(&self, job: &RenderJob) -> std::result::Result<PathBuf, RenderError> {
        self.jobs.lock().await.push(job.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(RenderError::new(job, anyhow!("net::ERR_CONNECTION_REFUSED")));
        }
        let path = job.output_path(&self.output_dir);
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|err| RenderError::new(job, err.into()))?;
        tokio::fs::write(&path, format!("%PDF-1.4\n{}\n%%EOF", job.url))
            .await
            .map_err(|err| RenderError::new(job, err.into()))?;
        Ok(path)
    }
}

/// 🪣 An object store that keeps objects in a HashMap and signs with a fake host.
#[derive(Debug, Default, Clone)]
pub struct InMemoryObjectStore {
    /// 🗄️ `(bucket, key)` → bytes.
    pub objects: Arc<Mutex<HashMap<(String, String), Vec<u8>>>>,
    pub fail_uploads: Arc<AtomicBool>,
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<()> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            bail!("💀 AccessDenied: s3://{bucket}/{key}");
        }
        self.objects
            .lock()
            .await
            .insert((bucket.to_string(), key.to_string()), body);
        Ok(())
    }

    async fn presign_get(&self, bucket: &str, key: &str, expires_in: Duration) -> Result<String> {
        if !self
            .objects
            .lock()
            .await
            .contains_key(&(bucket.to_string(), key.to_string()))
        {
            bail!("💀 refusing to sign s3://{bucket}/{key}: nothing was uploaded there");
        }
        Ok(format!(
            "https://{bucket}.s3.example.test/{key}?X-Amz-Expires={}",
            expires_in.as_secs()
        ))
    }
}

/// ✉️ A mailer that files every message in a Vec. Addresses in `reject` bounce.
#[derive(Debug, Default, Clone)]
pub struct InMemoryMailer {
    pub sent: Arc<Mutex<Vec<EmailMessage>>>,
    pub reject: Arc<Mutex<Vec<String>>>,
}

impl InMemoryMailer {
    pub async fn rejecting(self, address: &str) -> Self {
        self.reject.lock().await.push(address.to_string());
        self
    }

    pub async fn recipients(&self) -> Vec<String> {
        self.sent.lock().await.iter().map(|m| m.to.clone()).collect()
    }
}

#[async_trait]
impl Mailer for InMemoryMailer {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        if self.reject.lock().await.contains(&message.to) {
            bail!("💀 550 mailbox unavailable: {}", message.to);
        }
        self.sent.lock().await.push(message.clone());
        Ok(())
    }
}

/// 💬 A chat sink that remembers every post.
#[derive(Debug, Clone)]
pub struct InMemoryChatSink {
    name: String,
    pub posts: Arc<Mutex<Vec<String>>>,
    pub fail: Arc<AtomicBool>,
}

impl InMemoryChatSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            posts: Arc::default(),
            fail: Arc::default(),
        }
    }

    pub fn failing(self) -> Self {
        self.fail.store(true, Ordering::SeqCst);
        self
    }

    /// 🔍 Posts containing `needle`.
    pub async fn posts_containing(&self, needle: &str) -> Vec<String> {
        self.posts
            .lock()
            .await
            .iter()
            .filter(|post| post.contains(needle))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ChatSink for InMemoryChatSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn post(&self, text: &str) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            bail!("💀 {} is down", self.name);
        }
        self.posts.lock().await.push(text.to_string());
        Ok(())
    }
}
