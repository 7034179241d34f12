//! 🪝 A generic incoming-webhook chat sink: `POST {url}` with `{"text": ...}`.
//! Works for Slack incoming webhooks, Mattermost, Google Chat, and whatever
//! else copied that shape.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{ChatSink, describe_failure, http_client};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct WebhookConfig {
    /// 🔗 No URL, no webhook sink. The channel is optional.
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            url: url.into(),
        })
    }
}

#[async_trait]
impl ChatSink for WebhookSink {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn post(&self, text: &str) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(&json!({ "text": text }))
            .send()
            .await
            .context("💀 Could not reach the chat webhook")?;
        if !response.status().is_success() {
            bail!("💀 The chat webhook refused the message: {}", describe_failure(response).await);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn the_one_where_the_text_is_posted_as_json() {
        let the_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hooks/abc"))
            .and(body_json(json!({"text": "*New Qualtrics response received:*"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&the_server)
            .await;

        WebhookSink::new(format!("{}/hooks/abc", the_server.uri()))
            .expect("💀 sink")
            .post("*New Qualtrics response received:*")
            .await
            .expect("💀 post should succeed");
    }

    #[tokio::test]
    async fn the_one_where_a_500_is_reported_back() {
        let the_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&the_server)
            .await;

        let the_sink = WebhookSink::new(the_server.uri()).expect("💀 sink");
        assert!(the_sink.post("hi").await.is_err());
    }
}
