//! 🔧 App Configuration: the sacred TOML-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing." (every developer at 3am) 🦆
//!
//! 🏗️ Powered by Figment, because manually parsing env vars is a form of
//! self-harm that even the borrow checker wouldn't approve of.
//!
//! 🧠 Knowledge graph:
//! - Every section struct lives next to the code it configures (`QualtricsConfig`
//!   in `backends/qualtrics.rs`, `StorageConfig` in `store.rs`, and so on).
//!   This file only stitches them together and loads them.
//! - Layers: legacy env names → `RPX_*` env vars → optional TOML file. TOML wins.
//! - Built once at start-up, then shared read-only. Nobody mutates config at runtime.
//!   Nobody. Not even on Fridays.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use tracing::info;

use crate::backends::mailgun::MailgunConfig;
use crate::backends::qualtrics::QualtricsConfig;
use crate::backends::slack::SlackConfig;
use crate::backends::webdriver::RendererConfig;
use crate::backends::webhook::WebhookConfig;
use crate::notify::DispatchConfig;
use crate::pipeline::PipelineConfig;
use crate::render::ReportConfig;
use crate::server::ServerConfig;
use crate::store::{MAX_SIGNED_URL_EXPIRY, StorageConfig};

/// 🔒 A string that refuses to show up in logs.
///
/// `Debug` prints `***`. The only way to read it is [`Secret::expose`], which
/// is greppable, which is the point.
#[derive(Clone, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// 📦 The AppConfig: one struct to rule them all, one struct to find them,
/// one struct to bring them all, and in the Figment bind them.
///
/// Every section defaults, so an empty file plus three API tokens boots a server.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub qualtrics: QualtricsConfig,
    #[serde(default)]
    pub renderer: RendererConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub mailgun: MailgunConfig,
    #[serde(default)]
    pub notify: DispatchConfig,
    #[serde(default)]
    pub slack: SlackConfig,
    #[serde(default)]
    pub chat_webhook: WebhookConfig,
}

impl AppConfig {
    /// ✅ Rejects configs that would parse fine and then fail at 3am.
    pub fn validate(&self) -> anyhow::Result<()> {
        let expiry = Duration::from_secs(self.storage.signed_url_expiry_secs);
        if expiry > MAX_SIGNED_URL_EXPIRY {
            anyhow::bail!(
                "💀 storage.signed_url_expiry_secs = {} but the object store caps signed URLs at {} seconds (one week). We refuse to quietly shorten it for you.",
                self.storage.signed_url_expiry_secs,
                MAX_SIGNED_URL_EXPIRY.as_secs()
            );
        }
        if self.renderer.workers == 0 || self.renderer.queue_capacity == 0 {
            anyhow::bail!(
                "💀 renderer.workers and renderer.queue_capacity must both be at least 1. Zero workers render zero reports, which is a very stable but very useless service."
            );
        }
        if !(0.0..=1.0).contains(&self.renderer.partial_image_ratio) {
            anyhow::bail!(
                "💀 renderer.partial_image_ratio must be between 0.0 and 1.0, got {}",
                self.renderer.partial_image_ratio
            );
        }
        if self.report.base_url.trim().is_empty() {
            anyhow::bail!("💀 report.base_url is empty. The browser needs somewhere to go.");
        }
        Ok(())
    }
}

/// 🏚️ The environment variable names the first deployment used. Still honored,
/// because somebody's fly.io secrets still say them.
const LEGACY_ENV_VARS: [&str; 3] = ["QUALTRICS_API_TOKEN", "MAILGUN_API_KEY", "SLACK_API_TOKEN"];

/// 🔄 Legacy env name → dotted config key.
fn legacy_key(name: &str) -> String {
    match name.to_ascii_uppercase().as_str() {
        "QUALTRICS_API_TOKEN" => "qualtrics.api_token".to_string(),
        "MAILGUN_API_KEY" => "mailgun.api_key".to_string(),
        "SLACK_API_TOKEN" => "slack.token".to_string(),
        other => other.to_ascii_lowercase(),
    }
}

/// 🚀 Load the config: from a file, from env vars, or from the sheer power of hoping.
///
/// 📐 Same rules as always:
///   - `config_file_name` is None → env vars only.
///   - `config_file_name` is Some → env vars + TOML file, merged. TOML wins on conflicts.
///
/// `RPX_SERVER__PORT=9090` becomes `server.port = 9090`. Double underscore
/// means "go one table deeper".
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let config = Figment::new()
        .merge(
            Env::raw()
                .only(&LEGACY_ENV_VARS)
                .map(|key| legacy_key(key.as_str()).into()),
        )
        .merge(Env::prefixed("RPX_").split("__"));

    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (RPX_*). \
             The file exists in our hearts, but apparently not in a shape serde recognizes.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (RPX_*). \
                 No file was provided, so this one's all on the environment. Classic."
            .to_string(),
    };

    let app_config: AppConfig = config.extract().context(context_msg)?;
    app_config
        .validate()
        .context("💀 Configuration parsed but did not pass validation")?;
    Ok(app_config)
}
