//! 🖨️🌐 WebDriver renderer: drives a headless browser over the W3C WebDriver
//! protocol (chromedriver, geckodriver, a selenium grid, whatever answers on
//! `renderer.webdriver_url`) and prints the report page to PDF.
//!
//! 🎬 *[POST /session. a browser wakes up, confused, headless. it is handed a
//! URL. it loads charts. it is asked to print. it is deleted. it never knew
//! what hit it.]*
//!
//! 🧠 Knowledge graph:
//! - One fresh session per job. Never reused, always deleted (success or not).
//! - Flow: session → navigate → image settle → network idle → print → decode
//!   base64 → write `{output_dir}/{job_id}.pdf` → delete session.
//! - Settle logic lives in `settle.rs` and knows nothing about HTTP.
//! - Every failure is wrapped into one [`RenderError`]. No retries in here.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Method;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, info, trace, warn};

use super::ReportRenderer;
use crate::render::{RenderError, RenderJob};

pub mod settle;

use settle::{
    ImageSettlePolicy, ImageStatus, NetworkIdlePolicy, NetworkStatus, settle_images,
    wait_for_network_idle,
};

const IMAGE_STATUS_SCRIPT: &str = "const imgs = Array.from(document.images).filter((i) => { const r = i.getBoundingClientRect(); return r.width > 0 || r.height > 0; }); return { total: imgs.length, loaded: imgs.filter((i) => i.complete && i.naturalWidth > 0 && i.naturalHeight > 0).length };";

const NETWORK_STATUS_SCRIPT: &str = "return { readyState: document.readyState, resources: performance.getEntriesByType('resource').length };";

/// 📐 US Letter, in the centimeters WebDriver insists on.
const LETTER_WIDTH_CM: f64 = 21.59;
const LETTER_HEIGHT_CM: f64 = 27.94;

/// ⚙️ The browser, the crew size, and every timer in the settle ladder.
#[derive(Debug, Deserialize, Clone)]
pub struct RendererConfig {
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,
    #[serde(default = "default_browser_name")]
    pub browser_name: String,
    #[serde(default = "default_browser_args")]
    pub browser_args: Vec<String>,
    /// 🧵 Concurrent browser sessions.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// 📬 Jobs allowed to wait for a worker before callers start waiting too.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_image_timeout_secs")]
    pub image_timeout_secs: u64,
    #[serde(default = "default_partial_image_timeout_secs")]
    pub partial_image_timeout_secs: u64,
    #[serde(default = "default_partial_image_ratio")]
    pub partial_image_ratio: f64,
    #[serde(default = "default_fallback_delay_secs")]
    pub fallback_delay_secs: u64,
    #[serde(default = "default_network_idle_timeout_secs")]
    pub network_idle_timeout_secs: u64,
    #[serde(default = "default_network_idle_window_ms")]
    pub network_idle_window_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// ⏱️ Per WebDriver command. Page loads for chart-heavy reports are not quick.
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
}

fn default_webdriver_url() -> String {
    "http://localhost:4444".to_string()
}
fn default_browser_name() -> String {
    "chrome".to_string()
}
fn default_browser_args() -> Vec<String> {
    ["--headless=new", "--no-sandbox", "--disable-gpu", "--disable-dev-shm-usage"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_workers() -> usize {
    2
}
fn default_queue_capacity() -> usize {
    16
}
fn default_image_timeout_secs() -> u64 {
    20
}
fn default_partial_image_timeout_secs() -> u64 {
    10
}
fn default_partial_image_ratio() -> f64 {
    0.8
}
fn default_fallback_delay_secs() -> u64 {
    3
}
fn default_network_idle_timeout_secs() -> u64 {
    10
}
fn default_network_idle_window_ms() -> u64 {
    500
}
fn default_poll_interval_ms() -> u64 {
    250
}
fn default_command_timeout_secs() -> u64 {
    120
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            webdriver_url: default_webdriver_url(),
            browser_name: default_browser_name(),
            browser_args: default_browser_args(),
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            image_timeout_secs: default_image_timeout_secs(),
            partial_image_timeout_secs: default_partial_image_timeout_secs(),
            partial_image_ratio: default_partial_image_ratio(),
            fallback_delay_secs: default_fallback_delay_secs(),
            network_idle_timeout_secs: default_network_idle_timeout_secs(),
            network_idle_window_ms: default_network_idle_window_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            command_timeout_secs: default_command_timeout_secs(),
        }
    }
}

impl RendererConfig {
    pub fn image_policy(&self) -> ImageSettlePolicy {
        ImageSettlePolicy {
            full_timeout: Duration::from_secs(self.image_timeout_secs),
            partial_timeout: Duration::from_secs(self.partial_image_timeout_secs),
            partial_ratio: self.partial_image_ratio,
            fallback_delay: Duration::from_secs(self.fallback_delay_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }

    pub fn network_policy(&self) -> NetworkIdlePolicy {
        NetworkIdlePolicy {
            timeout: Duration::from_secs(self.network_idle_timeout_secs),
            idle_window: Duration::from_millis(self.network_idle_window_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }

    /// 🎭 New-session capabilities. Vendor options only for the vendor in use.
    fn capabilities(&self) -> Value {
        let mut always_match = json!({
            "browserName": self.browser_name,
            "pageLoadStrategy": "normal",
        });
        let vendor_key = match self.browser_name.as_str() {
            "chrome" | "chromium" => Some("goog:chromeOptions"),
            "MicrosoftEdge" | "msedge" => Some("ms:edgeOptions"),
            "firefox" => Some("moz:firefoxOptions"),
            _ => None,
        };
        if let (Some(key), Some(map)) = (vendor_key, always_match.as_object_mut()) {
            map.insert(key.to_string(), json!({ "args": self.browser_args }));
        }
        json!({ "capabilities": { "alwaysMatch": always_match } })
    }
}

/// 🖨️ The real renderer. Usually sits behind a [`RenderPool`](crate::render::RenderPool).
#[derive(Debug, Clone)]
pub struct WebDriverRenderer {
    client: reqwest::Client,
    config: RendererConfig,
    output_dir: PathBuf,
}

impl WebDriverRenderer {
    pub fn new(config: RendererConfig, output_dir: impl Into<PathBuf>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.command_timeout_secs))
            .build()
            .context("💀 The WebDriver HTTP client refused to be born")?;
        Ok(Self {
            client,
            config,
            output_dir: output_dir.into(),
        })
    }

    /// 📡 One WebDriver command. Returns the `value` member of the reply.
    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        let url = format!("{}/{}", self.config.webdriver_url.trim_end_matches('/'), path);
        trace!("🌐 webdriver {method} {url}");
        let mut request = self.client.request(method.clone(), &url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("💀 WebDriver did not answer {method} {path}. Is the driver running at {}?", self.config.webdriver_url))?;
        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .with_context(|| format!("💀 WebDriver answered {method} {path} with something that is not JSON"))?;
        let value = payload.get("value").cloned().unwrap_or(Value::Null);
        if !status.is_success() {
            bail!(
                "💀 WebDriver {method} {path} failed with {status}: {} ({})",
                value.get("error").and_then(Value::as_str).unwrap_or("unknown error"),
                value.get("message").and_then(Value::as_str).unwrap_or("no message")
            );
        }
        Ok(value)
    }

    async fn new_session(&self) -> Result<String> {
        let value = self
            .command(Method::POST, "session", Some(self.config.capabilities()))
            .await
            .context("💀 Could not start a browser session")?;
        value
            .get("sessionId")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| anyhow!("💀 WebDriver created a session but forgot to tell us its id"))
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        self.command(Method::DELETE, &format!("session/{session_id}"), None)
            .await
            .map(|_| ())
    }

    async fn execute<T: DeserializeOwned>(&self, session_id: &str, script: &str) -> Result<T> {
        let value = self
            .command(
                Method::POST,
                &format!("session/{session_id}/execute/sync"),
                Some(json!({ "script": script, "args": [] })),
            )
            .await?;
        serde_json::from_value(value).context("💀 The page script returned an unexpected shape")
    }

    async fn print_pdf(&self, session_id: &str) -> Result<Vec<u8>> {
        let value = self
            .command(
                Method::POST,
                &format!("session/{session_id}/print"),
                Some(json!({
                    "orientation": "portrait",
                    "background": true,
                    "shrinkToFit": true,
                    "page": { "width": LETTER_WIDTH_CM, "height": LETTER_HEIGHT_CM },
                })),
            )
            .await
            .context("💀 The browser refused to print the report")?;
        let encoded = value
            .as_str()
            .ok_or_else(|| anyhow!("💀 The print command returned no PDF data"))?;
        STANDARD
            .decode(encoded)
            .context("💀 The printed PDF was not valid base64")
    }

    /// 🎬 Everything that happens while the session is alive.
    async fn render_in_session(&self, session_id: &str, job: &RenderJob) -> Result<PathBuf> {
        self.command(
            Method::POST,
            &format!("session/{session_id}/url"),
            Some(json!({ "url": job.url })),
        )
        .await
        .with_context(|| format!("💀 The browser could not open the report page for job {}", job.job_id))?;

        let images = settle_images(&self.config.image_policy(), move || {
            self.execute::<ImageStatus>(session_id, IMAGE_STATUS_SCRIPT)
        })
        .await;
        debug!("🖼️ job {}: images settled ({images:?})", job.job_id);

        let quiet = wait_for_network_idle(&self.config.network_policy(), move || {
            self.execute::<NetworkStatus>(session_id, NETWORK_STATUS_SCRIPT)
        })
        .await;
        if !quiet {
            warn!(
                "⚠️ job {}: the network never went quiet within {}s. Printing anyway.",
                job.job_id, self.config.network_idle_timeout_secs
            );
        }

        let pdf = self.print_pdf(session_id).await?;
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .with_context(|| format!("💀 Could not create the output directory {}", self.output_dir.display()))?;
        let path = job.output_path(&self.output_dir);
        tokio::fs::write(&path, &pdf)
            .await
            .with_context(|| format!("💀 Could not write the PDF to {}", path.display()))?;
        Ok(path)
    }
}

#[async_trait]
impl ReportRenderer for WebDriverRenderer {
    async fn render(&self, job: &RenderJob) -> std::result::Result<PathBuf, RenderError> {
        let session_id = self
            .new_session()
            .await
            .map_err(|err| RenderError::new(job, err))?;
        debug!("🌐 job {}: browser session {session_id} open", job.job_id);

        let result = self.render_in_session(&session_id, job).await;

        if let Err(err) = self.delete_session(&session_id).await {
            warn!("⚠️ job {}: could not close browser session {session_id}: {err:#}", job.job_id);
        }

        let path = result.map_err(|err| RenderError::new(job, err))?;
        info!("🖨️ job {}: report printed to {}", job.job_id, path.display());
        Ok(path)
    }
}
