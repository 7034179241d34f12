//! 📋 Qualtrics: the survey platform. We ask for one response by id, it
//! hands back a JSON blob with `result.values` buried inside.
//!
//! `GET {base_url}/surveys/{survey_id}/responses/{response_id}` with an
//! `X-API-TOKEN` header. That's the whole API surface we use. One endpoint.
//! Minimalism.

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::{SurveyPlatform, describe_failure, http_client};
use crate::app_config::Secret;

#[derive(Debug, Deserialize, Clone)]
pub struct QualtricsConfig {
    /// 🌐 Data-center specific API root. `iad1` unless your account lives elsewhere.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_token: Option<Secret>,
}

fn default_base_url() -> String {
    "https://iad1.qualtrics.com/API/v3".to_string()
}

impl Default for QualtricsConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_token: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QualtricsClient {
    client: reqwest::Client,
    config: QualtricsConfig,
}

impl QualtricsClient {
    pub fn new(config: QualtricsConfig) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            config,
        })
    }

    /// 🔗 Each id becomes exactly one percent-encoded path segment. A webhook
    /// can name a response, never a different endpoint.
    fn response_url(&self, survey_id: &str, response_id: &str) -> Result<Url> {
        for id in [survey_id, response_id] {
            if matches!(id.trim(), "" | "." | "..") {
                bail!("💀 '{id}' is not a usable survey or response id");
            }
        }
        let mut url = Url::parse(&self.config.base_url)
            .with_context(|| format!("💀 qualtrics.base_url '{}' is not a URL", self.config.base_url))?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("💀 qualtrics.base_url '{}' cannot carry a path", self.config.base_url))?
            .pop_if_empty()
            .extend(["surveys", survey_id, "responses", response_id]);
        Ok(url)
    }
}

#[async_trait]
impl SurveyPlatform for QualtricsClient {
    async fn fetch_response(&self, survey_id: &str, response_id: &str) -> Result<Value> {
        let url = self.response_url(survey_id, response_id)?;
        debug!("📡 fetching survey response {response_id} from {url}");

        let mut request = self.client.get(url);
        if let Some(token) = &self.config.api_token {
            request = request.header("X-API-TOKEN", token.expose());
        }

        let response = request.send().await.with_context(|| {
            format!("💀 Could not reach the survey platform for response {response_id}. Check connectivity and qualtrics.base_url.")
        })?;
        if !response.status().is_success() {
            bail!(
                "💀 The survey platform refused response {response_id} of survey {survey_id}: {}",
                describe_failure(response).await
            );
        }
        response.json::<Value>().await.with_context(|| {
            format!("💀 The survey platform sent back something for {response_id} that is not JSON")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> QualtricsClient {
        QualtricsClient::new(QualtricsConfig {
            base_url: format!("{}/API/v3/", server.uri()),
            api_token: Some(Secret::new("tok-123")),
        })
        .expect("💀 client")
    }

    #[tokio::test]
    async fn the_one_where_the_token_rides_along_and_the_body_comes_back() {
        let the_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/API/v3/surveys/SV_1/responses/R_1"))
            .and(header("X-API-TOKEN", "tok-123"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"result": {"values": {"QID9_TEXT": "Ruby"}}})),
            )
            .expect(1)
            .mount(&the_server)
            .await;

        let the_body = client_for(&the_server)
            .fetch_response("SV_1", "R_1")
            .await
            .expect("💀 fetch should succeed");
        assert_eq!(the_body["result"]["values"]["QID9_TEXT"], "Ruby");
    }

    #[tokio::test]
    async fn the_one_where_a_404_is_an_error_not_an_empty_report() {
        let the_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no such response"))
            .mount(&the_server)
            .await;

        let the_err = client_for(&the_server)
            .fetch_response("SV_1", "R_missing")
            .await
            .expect_err("💀 a 404 must not look like success");
        assert!(format!("{the_err:#}").contains("R_missing"));
    }

    #[tokio::test]
    async fn the_one_where_a_dotted_response_id_stays_inside_its_own_segment() {
        let the_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/API/v3/whoami"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"result": {"userId": "UR_secret"}})))
            .expect(0)
            .mount(&the_server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no such response"))
            .mount(&the_server)
            .await;

        let the_err = client_for(&the_server)
            .fetch_response("SV_1", "../../../whoami")
            .await
            .expect_err("💀 a traversal id must not reach another endpoint");
        assert!(!format!("{the_err:#}").contains("UR_secret"));

        let the_requests = the_server.received_requests().await.unwrap_or_default();
        assert_eq!(the_requests.len(), 1);
        let the_path = the_requests[0].url.path();
        assert!(the_path.starts_with("/API/v3/surveys/SV_1/responses/"), "went to {the_path}");
        assert!(!the_path.contains("../"), "went to {the_path}");
    }

    #[tokio::test]
    async fn the_one_where_a_bare_dot_dot_is_refused_before_any_request() {
        let the_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"result": {}})))
            .expect(0)
            .mount(&the_server)
            .await;

        let the_client = client_for(&the_server);
        assert!(the_client.fetch_response("SV_1", "..").await.is_err());
        assert!(the_client.fetch_response("", "R_1").await.is_err());
    }
}
