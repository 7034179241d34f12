//! 🧪 Shared rig for the webhook tests: a wiremock survey platform, in-memory
//! everything else, and the real router on top.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::Request;
use axum::http::header::CONTENT_TYPE;
use rpx::app_config::{AppConfig, Secret};
use rpx::backends::in_mem::{InMemoryChatSink, InMemoryMailer, InMemoryObjectStore, InMemoryRenderer};
use rpx::backends::qualtrics::{QualtricsClient, QualtricsConfig};
use rpx::backends::s3::BucketConfig;
use rpx::common::ReportVariant;
use rpx::pipeline::{Backends, Pipeline};
use rpx::server::{ServerConfig, router};
use serde_json::{Map, Value, json};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const ADULT_SURVEY: &str = "SV_5zNrXkf1Z4ozvRs";
pub const ATHLETE_SURVEY: &str = "SV_athlete";

pub struct Stack {
    pub qualtrics: MockServer,
    pub renderer: InMemoryRenderer,
    pub objects: InMemoryObjectStore,
    pub mailer: InMemoryMailer,
    pub chat: InMemoryChatSink,
    pub router: Router,
    pub dir: tempfile::TempDir,
}

impl Stack {
    pub async fn start() -> Self {
        Self::start_with(|renderer| renderer).await
    }

    pub async fn start_with(tweak: impl FnOnce(InMemoryRenderer) -> InMemoryRenderer) -> Self {
        let dir = tempfile::tempdir().expect("💀 tempdir");
        let qualtrics = MockServer::start().await;

        let mut config = AppConfig::default();
        config.report.base_url = "https://reports.example.com".to_string();
        config.report.output_dir = dir.path().to_path_buf();
        config
            .pipeline
            .survey_ids
            .insert(ReportVariant::MindsetAthlete, ATHLETE_SURVEY.to_string());
        config
            .storage
            .buckets
            .insert(ReportVariant::MindsetAthlete, BucketConfig::named("athlete-reports"));
        config.notify.admin_address = Some("admin@example.com".to_string());
        config.notify.fallback_provider_address = "frontdesk@example.com".to_string();
        config.notify.providers = HashMap::from([
            ("Dr. Jane Smith".to_string(), "jane@example.com".to_string()),
            ("Coach Bo".to_string(), "bo@example.com".to_string()),
        ]);
        config.qualtrics = QualtricsConfig {
            base_url: qualtrics.uri(),
            api_token: Some(Secret::new("test-token")),
        };

        let renderer = tweak(InMemoryRenderer::new(dir.path()));
        let objects = InMemoryObjectStore::default();
        let mailer = InMemoryMailer::default();
        let chat = InMemoryChatSink::new("slack");

        let pipeline = Pipeline::new(
            &config,
            Backends {
                survey: Arc::new(QualtricsClient::new(config.qualtrics.clone()).expect("💀 client")),
                renderer: Arc::new(renderer.clone()),
                objects: Arc::new(objects.clone()),
                mailer: Arc::new(mailer.clone()),
                chat: vec![Arc::new(chat.clone())],
            },
        );
        let router = router(
            Arc::new(pipeline),
            &ServerConfig {
                static_dir: None,
                ..ServerConfig::default()
            },
        );

        Self {
            qualtrics,
            renderer,
            objects,
            mailer,
            chat,
            router,
            dir,
        }
    }

    /// 📋 Serve `body` for one response id, and insist on being asked exactly once.
    pub async fn serve_response(&self, survey_id: &str, response_id: &str, body: Value) {
        Mock::given(method("GET"))
            .and(path(format!("/surveys/{survey_id}/responses/{response_id}")))
            .and(header("X-API-TOKEN", "test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .expect(1)
            .mount(&self.qualtrics)
            .await;
    }

    /// ⏳ Polls chat until `count` posts contain `needle`, or fails after five seconds.
    pub async fn wait_for_post(&self, needle: &str, count: usize) -> Vec<String> {
        for _ in 0..200 {
            let the_posts = self.chat.posts_containing(needle).await;
            if the_posts.len() >= count {
                return the_posts;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!(
            "💀 waited five seconds for {count} post(s) containing {needle:?}; chat saw {:?}",
            self.chat.posts.lock().await
        );
    }

    pub async fn object(&self, bucket: &str, key: &str) -> Option<String> {
        self.objects
            .objects
            .lock()
            .await
            .get(&(bucket.to_string(), key.to_string()))
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }
}

pub fn form_post(uri: &str, body: &str) -> Request<Body> {
    Request::post(uri)
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .expect("💀 request")
}

pub fn json_post(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("💀 request")
}

fn body_with(values: Map<String, Value>, labels: Value) -> Value {
    json!({ "result": { "values": values, "labels": labels } })
}

/// 📊 Every Adult score field besides `GP`: (query param, survey key, raw value).
/// Percentiles carry their `%` the way the survey export does.
pub const ADULT_SCORES: &[(&str, &str, &str)] = &[
    ("growthMindsetPercentileHighSchool", "GMHSComparison", "71%"),
    ("growthMindsetPercentileCollege", "GMColComparison", "64%"),
    ("growthMindsetPercentilePro", "GMProComparison", "58%"),
    ("growthMindsetScore", "GMScore", "42"),
    ("mentalSkillsPercentile", "PP", "55%"),
    ("mentalSkillsPercentileHighSchool", "MSHSComparison", "61%"),
    ("mentalSkillsPercentileCollege", "MSColComparison", "49%"),
    ("mentalSkillsPercentilePro", "MSProComparison", "38%"),
    ("mentalSkillsScore", "MSScore", "37"),
    ("teamSupportPercentile", "TP", "73%"),
    ("teamSupportPercentileHighSchool", "TSHSComparison", "80%"),
    ("teamSupportPercentileCollege", "TSColComparison", "69%"),
    ("teamSupportPercentilePro", "TSProComparison", "52%"),
    ("teamSupportScore", "TSScore", "45"),
    ("healthHabitsPercentile", "PhP", "66%"),
    ("healthHabitsPercentileHighSchool", "HHHSComparison", "70%"),
    ("healthHabitsPercentileCollege", "HHColComparison", "62%"),
    ("healthHabitsPercentilePro", "HHProComparison", "47%"),
    ("healthHabitsScore", "HHScore", "39"),
    ("selfReflectionPercentile", "MP", "81%"),
    ("selfReflectionPercentileHighSchool", "SRHSComparison", "85%"),
    ("selfReflectionPercentileCollege", "SRColComparison", "77%"),
    ("selfReflectionPercentilePro", "SRProComparison", "60%"),
    ("selfReflectionScore", "SRScore", "48"),
];

/// 🧪 A complete English Adult response the way the survey platform sends it.
pub fn adult_body(name: &str, email: &str, growth_percentile: &str) -> Value {
    adult_body_in(name, email, growth_percentile, "EN")
}

/// 🧪 Same, in the respondent's chosen `userLanguage`.
pub fn adult_body_in(name: &str, email: &str, growth_percentile: &str, language: &str) -> Value {
    let mut values = Map::new();
    for (key, value) in [
        ("QID9_TEXT", name),
        ("QID12_TEXT", email),
        ("recordedDate", "2024-03-01T12:00:00Z"),
        ("userLanguage", language),
        ("Level", "college"),
        ("GP", growth_percentile),
    ] {
        values.insert(key.to_string(), json!(value));
    }
    for (_, key, value) in ADULT_SCORES {
        values.insert(key.to_string(), json!(value));
    }
    body_with(values, json!({ "QID14": "Dr. Jane Smith" }))
}

/// 🔍 The render URL's query, decoded into a map.
pub fn query_of(url: &str) -> HashMap<String, String> {
    url::Url::parse(url)
        .expect("💀 render URL should parse")
        .query_pairs()
        .into_owned()
        .collect()
}

/// 🧪 A Mindset-Athlete response with a comma-separated provider list.
pub fn athlete_body(name: &str, email: &str, providers: &str) -> Value {
    let mut values = Map::new();
    for (key, value) in [
        ("QID9_TEXT", name),
        ("QID12_TEXT", email),
        ("recordedDate", "2024-03-02T08:30:00Z"),
        ("Level", "pro"),
        ("GP", "91%"),
    ] {
        values.insert(key.to_string(), json!(value));
    }
    body_with(values, json!({ "QID14": providers, "QID15": "Golf, Tennis" }))
}
