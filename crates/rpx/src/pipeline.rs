//! 🚂 The pipeline orchestrator: fetch → map → render → upload → notify.
//!
//! 🎬 COLD OPEN: INT. WEBHOOK HANDLER, 200 MICROSECONDS AFTER ACK
//!
//! The survey platform already got its 200 and went home. Nobody is waiting
//! on us anymore. This is where the actual work happens, one stage at a time,
//! each one allowed to fail without taking the server down with it.
//!
//! 🧠 Knowledge graph:
//! - [`SurveyCatalog`]: which survey id belongs to which variant. Anything
//!   else is dropped before a single byte is fetched.
//! - [`PipelineState`]: where an instance is, published on a `tokio::sync::watch`
//!   channel. The deadline reads it to name the stage that was in flight.
//! - [`PipelineError`]: stage + response id + cause. One `error!`, one chat
//!   post, instance over.
//! - Notification problems never become a `PipelineError`. They live in the
//!   [`DispatchResult`] and in chat.
//! - Instances share nothing mutable. Two webhooks for the same response run twice.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::app_config::AppConfig;
use crate::backends::mailgun::MailgunMailer;
use crate::backends::qualtrics::QualtricsClient;
use crate::backends::s3::S3ObjectStore;
use crate::backends::slack::SlackSink;
use crate::backends::webdriver::WebDriverRenderer;
use crate::backends::webhook::WebhookSink;
use crate::backends::{ChatSink, Mailer, ObjectStore, ReportRenderer, SurveyPlatform};
use crate::common::{ReportVariant, SurveyEvent, SurveyResponseRecord};
use crate::mapper::map_response;
use crate::notify::templates::{failure_message, received_message};
use crate::notify::{DispatchResult, Dispatcher};
use crate::render::{RenderJob, RenderPool};
use crate::store::ArtifactStore;

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    /// ⏱️ Overall deadline for one instance, fetch through notify.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// 📋 Variant → the survey id its endpoint accepts.
    #[serde(default = "default_survey_ids")]
    pub survey_ids: HashMap<ReportVariant, String>,
}

fn default_timeout_secs() -> u64 {
    900
}

fn default_survey_ids() -> HashMap<ReportVariant, String> {
    HashMap::from([(ReportVariant::Adult, "SV_5zNrXkf1Z4ozvRs".to_string())])
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            survey_ids: default_survey_ids(),
        }
    }
}

/// 📋 The allow-list. A survey id is recognized only on its own variant's endpoint.
#[derive(Debug, Clone, Default)]
pub struct SurveyCatalog {
    survey_ids: HashMap<ReportVariant, String>,
}

impl SurveyCatalog {
    pub fn new(survey_ids: HashMap<ReportVariant, String>) -> Self {
        Self { survey_ids }
    }

    pub fn survey_id_for(&self, variant: ReportVariant) -> Option<&str> {
        self.survey_ids.get(&variant).map(String::as_str)
    }

    /// 🔍 The survey id to fetch with, if this endpoint accepts the event.
    ///
    /// A body without a survey id borrows the one configured for the endpoint.
    /// A body with one must match it exactly.
    pub fn resolve(&self, variant: ReportVariant, survey_id: Option<&str>) -> Option<&str> {
        let expected = self.survey_id_for(variant)?;
        match survey_id.map(str::trim) {
            Some(given) if !given.is_empty() => (expected == given).then_some(expected),
            _ => Some(expected),
        }
    }

    pub fn recognizes(&self, variant: ReportVariant, survey_id: Option<&str>) -> bool {
        self.resolve(variant, survey_id).is_some()
    }
}

/// 🏗️ The stages that can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Map,
    Render,
    Upload,
    Notify,
}

impl Stage {
    /// 📣 Chat headline for a failure in this stage.
    pub fn headline(&self) -> &'static str {
        match self {
            Self::Fetch => "Failed to fetch survey response",
            Self::Map => "Failed to map survey response",
            Self::Render => "Failed to generate report",
            Self::Upload => "Failed to upload report",
            Self::Notify => "Failed to send email",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.headline())
    }
}

/// 🚦 Where an instance is right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Received,
    Acknowledged,
    Fetching,
    Mapped,
    Rendering,
    Rendered,
    Uploading,
    Uploaded,
    Notifying,
    Done,
    Failed(Stage),
}

impl PipelineState {
    /// 🔍 The stage that owns this state, for blaming on timeout.
    pub fn stage_in_flight(&self) -> Stage {
        match self {
            Self::Received | Self::Acknowledged | Self::Fetching => Stage::Fetch,
            Self::Mapped | Self::Rendering => Stage::Render,
            Self::Rendered | Self::Uploading => Stage::Upload,
            Self::Uploaded | Self::Notifying | Self::Done => Stage::Notify,
            Self::Failed(stage) => *stage,
        }
    }
}

#[derive(Debug, Error)]
#[error("💀 {stage} for response {response_id}: {source:#}")]
pub struct PipelineError {
    pub stage: Stage,
    pub response_id: String,
    /// 📧 Known once the response was mapped. Makes the chat post more useful.
    pub email: Option<String>,
    #[source]
    pub source: anyhow::Error,
}

impl PipelineError {
    fn new(stage: Stage, response_id: &str, email: Option<&str>, source: anyhow::Error) -> Self {
        Self {
            stage,
            response_id: response_id.to_string(),
            email: email.map(str::to_string),
            source,
        }
    }
}

/// 🏁 What a successful instance produced.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub record: SurveyResponseRecord,
    pub report_url: String,
    pub dispatch: DispatchResult,
}

/// 🔌 Every external seam the pipeline needs, already built.
#[derive(Debug, Clone)]
pub struct Backends {
    pub survey: Arc<dyn SurveyPlatform>,
    pub renderer: Arc<dyn ReportRenderer>,
    pub objects: Arc<dyn ObjectStore>,
    pub mailer: Arc<dyn Mailer>,
    pub chat: Vec<Arc<dyn ChatSink>>,
}

#[derive(Debug)]
pub struct Pipeline {
    catalog: SurveyCatalog,
    survey: Arc<dyn SurveyPlatform>,
    renderer: Arc<dyn ReportRenderer>,
    store: ArtifactStore,
    dispatcher: Dispatcher,
    report_base_url: String,
    timeout: Duration,
}

impl Pipeline {
    pub fn new(config: &AppConfig, backends: Backends) -> Self {
        let link_valid_days = config.storage.signed_url_expiry_secs.div_ceil(24 * 60 * 60);
        Self {
            catalog: SurveyCatalog::new(config.pipeline.survey_ids.clone()),
            survey: backends.survey,
            renderer: backends.renderer,
            store: ArtifactStore::new(backends.objects, config.storage.clone()),
            dispatcher: Dispatcher::new(
                backends.mailer,
                backends.chat,
                config.notify.clone(),
                link_valid_days,
            ),
            report_base_url: config.report.base_url.clone(),
            timeout: Duration::from_secs(config.pipeline.timeout_secs),
        }
    }

    /// 🚀 Builds the real backends from config. The render pool comes back
    /// separately so the caller can drain it on shutdown.
    pub async fn from_config(config: &AppConfig) -> anyhow::Result<(Self, Arc<RenderPool>)> {
        let webdriver = WebDriverRenderer::new(config.renderer.clone(), config.report.output_dir.clone())?;
        let pool = Arc::new(RenderPool::start(
            Arc::new(webdriver),
            config.renderer.workers,
            config.renderer.queue_capacity,
        ));

        let mut chat: Vec<Arc<dyn ChatSink>> = Vec::new();
        if config.slack.token.is_some() {
            chat.push(Arc::new(SlackSink::new(config.slack.clone())?));
        } else {
            warn!("⚠️ slack.token is not set. Slack posts are disabled.");
        }
        if let Some(url) = &config.chat_webhook.url {
            chat.push(Arc::new(WebhookSink::new(url.clone())?));
        }
        if config.qualtrics.api_token.is_none() {
            warn!("⚠️ qualtrics.api_token is not set. Every fetch will be rejected.");
        }

        let backends = Backends {
            survey: Arc::new(QualtricsClient::new(config.qualtrics.clone())?),
            renderer: pool.clone(),
            objects: Arc::new(S3ObjectStore::from_config(&config.storage).await?),
            mailer: Arc::new(MailgunMailer::new(config.mailgun.clone())?),
            chat,
        };
        Ok((Self::new(config, backends), pool))
    }

    pub fn recognizes(&self, variant: ReportVariant, event: &SurveyEvent) -> bool {
        self.catalog.recognizes(variant, event.survey_id.as_deref())
    }

    /// 📣 The "we got one" chat post. Goes out for every webhook, recognized or not.
    pub async fn announce_received(&self, event: &SurveyEvent) {
        let message = received_message(
            event.survey_id.as_deref().unwrap_or("N/A"),
            &event.response_id,
            event.completed_date.as_deref().unwrap_or("N/A"),
        );
        self.dispatcher.announce(&message).await;
    }

    /// 🚂 One full instance, with deadline and failure reporting.
    pub async fn run(
        &self,
        variant: ReportVariant,
        event: &SurveyEvent,
    ) -> Result<PipelineReport, PipelineError> {
        let (state, _) = watch::channel(PipelineState::Acknowledged);
        self.run_observed(variant, event, &state).await
    }

    /// 🔭 Same as [`Pipeline::run`], publishing every state change on `state`.
    pub async fn run_observed(
        &self,
        variant: ReportVariant,
        event: &SurveyEvent,
        state: &watch::Sender<PipelineState>,
    ) -> Result<PipelineReport, PipelineError> {
        let span = info_span!("pipeline", variant = %variant, response_id = %event.response_id);
        async move {
            let outcome = match tokio::time::timeout(self.timeout, self.execute(variant, event, state)).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    let stage = state.borrow().stage_in_flight();
                    Err(PipelineError::new(
                        stage,
                        &event.response_id,
                        None,
                        anyhow!("pipeline timed out after {}s", self.timeout.as_secs()),
                    ))
                }
            };

            match &outcome {
                Ok(report) => {
                    state.send_replace(PipelineState::Done);
                    info!(
                        "🏁 pipeline done: {} email(s) sent",
                        report.dispatch.emails().filter(|d| d.succeeded()).count()
                    );
                }
                Err(err) => {
                    state.send_replace(PipelineState::Failed(err.stage));
                    error!("{err}");
                    let message = failure_message(
                        err.stage.headline(),
                        &err.response_id,
                        err.email.as_deref(),
                        &format!("{:#}", err.source),
                    );
                    self.dispatcher.announce(&message).await;
                }
            }
            outcome
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        variant: ReportVariant,
        event: &SurveyEvent,
        state: &watch::Sender<PipelineState>,
    ) -> Result<PipelineReport, PipelineError> {
        let response_id = event.response_id.as_str();
        let survey_id = self
            .catalog
            .resolve(variant, event.survey_id.as_deref())
            .ok_or_else(|| {
                PipelineError::new(
                    Stage::Fetch,
                    response_id,
                    None,
                    anyhow!("survey {:?} is not the {variant} survey", event.survey_id),
                )
            })?;

        state.send_replace(PipelineState::Fetching);
        let body = self
            .survey
            .fetch_response(survey_id, response_id)
            .await
            .map_err(|err| PipelineError::new(Stage::Fetch, response_id, None, err))?;

        let record = map_response(variant, response_id, &body)
            .map_err(|err| PipelineError::new(Stage::Map, response_id, None, err.into()))?;
        state.send_replace(PipelineState::Mapped);
        let email = record.email.as_deref();

        let job = RenderJob::for_record(&self.report_base_url, &record);
        info!("🔗 render job {}: {}", job.job_id, job.url);
        state.send_replace(PipelineState::Rendering);
        let path = self
            .renderer
            .render(&job)
            .await
            .map_err(|err| PipelineError::new(Stage::Render, response_id, email, err.into()))?;
        state.send_replace(PipelineState::Rendered);

        state.send_replace(PipelineState::Uploading);
        let report_url = self
            .store
            .store(variant, &job.job_id, &path)
            .await
            .map_err(|err| PipelineError::new(Stage::Upload, response_id, email, err.into()))?;
        state.send_replace(PipelineState::Uploaded);
        debug!("🔗 signed report URL ready");

        state.send_replace(PipelineState::Notifying);
        let dispatch = self.dispatcher.notify(&record, &report_url).await;

        Ok(PipelineReport {
            record,
            report_url,
            dispatch,
        })
    }

    /// 🧵 Everything after the ack, for the fire-and-forget endpoints:
    /// received post, allow-list check, then the instance itself.
    pub fn spawn_acknowledged(self: &Arc<Self>, variant: ReportVariant, event: SurveyEvent) -> JoinHandle<()> {
        let pipeline = Arc::clone(self);
        tokio::spawn(async move {
            pipeline.announce_received(&event).await;
            if !pipeline.recognizes(variant, &event) {
                info!(
                    "🚫 survey {:?} is not the {variant} survey. Response {} dropped.",
                    event.survey_id, event.response_id
                );
                return;
            }
            // -- the outcome was already logged and posted to chat
            let _ = pipeline.run(variant, &event).await;
        })
    }
}
