//! 💬 Slack: `chat.postMessage` to one channel with a bot token.
//!
//! ⚠️ Slack answers HTTP 200 with `{"ok": false, "error": "..."}` when it's
//! unhappy. A 200 is not a success until the body says so.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use super::{ChatSink, describe_failure, http_client};
use crate::app_config::Secret;

#[derive(Debug, Deserialize, Clone)]
pub struct SlackConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub token: Option<Secret>,
    #[serde(default = "default_channel")]
    pub channel: String,
}

fn default_api_base() -> String {
    "https://slack.com/api".to_string()
}

fn default_channel() -> String {
    "C04J0DQ4GKS".to_string()
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            token: None,
            channel: default_channel(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SlackSink {
    client: reqwest::Client,
    config: SlackConfig,
}

impl SlackSink {
    pub fn new(config: SlackConfig) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            config,
        })
    }
}

#[async_trait]
impl ChatSink for SlackSink {
    fn name(&self) -> &str {
        "slack"
    }

    async fn post(&self, text: &str) -> Result<()> {
        let url = format!("{}/chat.postMessage", self.config.api_base.trim_end_matches('/'));
        let mut request = self
            .client
            .post(&url)
            .json(&json!({ "channel": self.config.channel, "text": text }));
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token.expose());
        }

        let response = request
            .send()
            .await
            .context("💀 Could not reach Slack. The message is lost to the void.")?;
        if !response.status().is_success() {
            bail!("💀 Slack refused the message: {}", describe_failure(response).await);
        }
        let body: Value = response
            .json()
            .await
            .context("💀 Slack answered with something that is not JSON")?;
        if body.get("ok").and_then(Value::as_bool) != Some(true) {
            bail!(
                "💀 Slack said not ok: {}",
                body.get("error").and_then(Value::as_str).unwrap_or("no error given")
            );
        }
        Ok(())
    }
}
