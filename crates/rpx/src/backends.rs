//! 🔌 Backends: where the real I/O happens.
//!
//! 🎭 This module is the casting agency. Every external system the pipeline
//! talks to gets a trait here and at least two actors: the real one (HTTP,
//! WebDriver, S3) and an in-memory understudy that records its lines for the
//! tests.
//!
//! 🧠 Knowledge graph:
//! - [`SurveyPlatform`]: fetch one raw response. Real: `qualtrics.rs`.
//! - [`ReportRenderer`]: URL in, PDF path out. Real: `webdriver.rs`, fronted by
//!   [`RenderPool`](crate::render::RenderPool).
//! - [`ObjectStore`]: put bytes, sign a GET. Real: `s3.rs`.
//! - [`Mailer`]: send one email. Real: `mailgun.rs`.
//! - [`ChatSink`]: post one line of text. Real: `slack.rs`, `webhook.rs`.
//! - Configs are co-located with their backend, same as everywhere else.
//! - `in_mem.rs`: the understudies.
//!
//! 🦆 The duck is here because every file must have one. This is law.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;

use crate::render::{RenderError, RenderJob};

pub mod in_mem;
pub mod mailgun;
pub mod qualtrics;
pub mod s3;
pub mod slack;
pub mod webdriver;
pub mod webhook;

/// 📋 The survey platform. Hands out raw response bodies, asks no questions.
#[async_trait]
pub trait SurveyPlatform: Send + Sync + std::fmt::Debug {
    /// 📡 The full JSON body for one response. `result.values` is in there somewhere.
    async fn fetch_response(&self, survey_id: &str, response_id: &str) -> Result<Value>;
}

/// 🖨️ Turns a report URL into a PDF on local disk.
///
/// # Contract
/// - Success means a complete PDF exists at the returned path.
/// - Every failure is a [`RenderError`]. No partial files are promised, or cleaned.
#[async_trait]
pub trait ReportRenderer: Send + Sync + std::fmt::Debug {
    async fn render(&self, job: &RenderJob) -> std::result::Result<PathBuf, RenderError>;
}

/// 🪣 Somewhere to park PDFs and get a time-limited link back.
#[async_trait]
pub trait ObjectStore: Send + Sync + std::fmt::Debug {
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<()>;
    /// 🔗 Pre-signed GET. Anyone holding the URL can read the object until it expires.
    async fn presign_get(&self, bucket: &str, key: &str, expires_in: Duration) -> Result<String>;
}

/// ✉️ One rendered email, ready for a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

#[async_trait]
pub trait Mailer: Send + Sync + std::fmt::Debug {
    async fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// 💬 A chat channel. Fire a line of text at it; it either lands or it doesn't.
#[async_trait]
pub trait ChatSink: Send + Sync + std::fmt::Debug {
    /// 🏷️ Short name for logs ("slack", "webhook", ...).
    fn name(&self) -> &str;
    async fn post(&self, text: &str) -> Result<()>;
}

/// 🔧 The HTTP client every REST backend shares the recipe for.
/// 10 second connect timeout because if a handshake takes longer, we're not
/// friends. 30 second request timeout because email APIs are not that slow.
pub(crate) fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(30))
        .build()
        .context("💀 The HTTP client refused to be born. The TLS stack wept. Probably a missing cert store or a cursed system OpenSSL.")
}

/// 📭 Reads the body of a failed response for the error message.
/// An unreadable body becomes an empty string; the status code is the headline anyway.
pub(crate) async fn describe_failure(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    format!("{status}: {body}")
}
