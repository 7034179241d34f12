//! ✉️ Mailgun: the email transport.
//!
//! `POST {api_base}/{domain}/messages`, basic auth `api:{key}`, a
//! form-encoded body with from/to/subject/html/text. The body is built with
//! `url::form_urlencoded` so we don't care which reqwest features are on today.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{EmailMessage, Mailer, describe_failure, http_client};
use crate::app_config::Secret;

#[derive(Debug, Deserialize, Clone)]
pub struct MailgunConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_domain")]
    pub domain: String,
    #[serde(default)]
    pub api_key: Option<Secret>,
}

fn default_api_base() -> String {
    "https://api.mailgun.net/v3".to_string()
}

fn default_domain() -> String {
    "mg.premiersportpsychology.com".to_string()
}

impl Default for MailgunConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            domain: default_domain(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MailgunMailer {
    client: reqwest::Client,
    config: MailgunConfig,
}

impl MailgunMailer {
    pub fn new(config: MailgunConfig) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            config,
        })
    }
}

/// 📦 `from=..&to=..&subject=..&html=..&text=..`
fn form_body(message: &EmailMessage) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .append_pair("from", &message.from)
        .append_pair("to", &message.to)
        .append_pair("subject", &message.subject)
        .append_pair("html", &message.html)
        .append_pair("text", &message.text)
        .finish()
}

#[async_trait]
impl Mailer for MailgunMailer {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        let url = format!(
            "{}/{}/messages",
            self.config.api_base.trim_end_matches('/'),
            self.config.domain
        );
        let key = self.config.api_key.as_ref().map(Secret::expose).unwrap_or_default();

        let response = self
            .client
            .post(&url)
            .basic_auth("api", Some(key))
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(form_body(message))
            .send()
            .await
            .with_context(|| format!("💀 Could not reach the mail API to email {}", message.to))?;
        if !response.status().is_success() {
            bail!(
                "💀 The mail API refused the email to {}: {}",
                message.to,
                describe_failure(response).await
            );
        }
        debug!("✉️ email to {} accepted by the mail API", message.to);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn the_message() -> EmailMessage {
        EmailMessage {
            from: "PSP <mindset@example.com>".to_string(),
            to: "ruby@example.com".to_string(),
            subject: "Your results".to_string(),
            html: "<p>hi & bye</p>".to_string(),
            text: "hi".to_string(),
        }
    }

    fn mailer_for(server: &MockServer) -> MailgunMailer {
        MailgunMailer::new(MailgunConfig {
            api_base: server.uri(),
            domain: "mg.example.com".to_string(),
            api_key: Some(Secret::new("key-abc")),
        })
        .expect("💀 mailer")
    }

    #[test]
    fn the_one_where_the_form_body_is_properly_encoded() {
        let the_body = form_body(&the_message());
        assert!(the_body.starts_with("from=PSP+%3Cmindset%40example.com%3E&to=ruby%40example.com"));
        assert!(the_body.contains("html=%3Cp%3Ehi+%26+bye%3C%2Fp%3E"));
    }

    #[tokio::test]
    async fn the_one_where_the_email_is_posted_with_basic_auth() {
        let the_server = MockServer::start().await;
        // 🔒 base64("api:key-abc")
        Mock::given(method("POST"))
            .and(path("/mg.example.com/messages"))
            .and(header("Authorization", "Basic YXBpOmtleS1hYmM="))
            .and(body_string_contains("to=ruby%40example.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"message": "Queued"})))
            .expect(1)
            .mount(&the_server)
            .await;

        mailer_for(&the_server)
            .send(&the_message())
            .await
            .expect("💀 send should succeed");
    }

    #[tokio::test]
    async fn the_one_where_a_401_is_a_failed_send() {
        let the_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Forbidden"))
            .mount(&the_server)
            .await;

        let the_err = mailer_for(&the_server)
            .send(&the_message())
            .await
            .expect_err("💀 401 should fail");
        assert!(format!("{the_err:#}").contains("401"));
    }
}
