//! 🖨️ Render jobs and the render pool.
//!
//! 🎬 *[a browser opens. a report loads. charts draw themselves, slowly, like
//! they're being paid by the hour. somewhere a PDF is born.]*
//!
//! 🧠 Knowledge graph:
//! - [`RenderJob`]: (report URL, job id). The URL is deterministic; log it,
//!   paste it into a browser, get the same report. Replayable by construction.
//! - [`RenderError`]: the ONE error class every render failure collapses into.
//! - [`RenderPool`]: a bounded queue + N [`RenderWorker`]s in front of the real
//!   renderer. Headless browsers eat RAM for breakfast; the pool decides how
//!   many get to eat at once.
//! - The actual browser driving lives in `backends/webdriver.rs`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::backends::ReportRenderer;
use crate::common::{ReportVariant, SurveyResponseRecord};
use crate::workers::Worker;
use crate::workers::render_worker::{RenderRequest, RenderWorker};

/// 🌐 Where the report frontend lives and where PDFs land before upload.
#[derive(Debug, Deserialize, Clone)]
pub struct ReportConfig {
    /// 📡 Externally reachable base URL of the report frontend.
    #[serde(default = "default_report_base_url")]
    pub base_url: String,
    /// 📁 Scratch directory for rendered PDFs. Emptied as uploads succeed.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_report_base_url() -> String {
    "https://psp-backend.fly.dev".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            base_url: default_report_base_url(),
            output_dir: default_output_dir(),
        }
    }
}

/// 🧹 Job ids end up in file names and object keys. Response ids from the
/// survey platform are `R_` + alphanumerics, but the webhook is the internet,
/// and the internet sends `../../etc/passwd` for fun.
pub fn sanitize_job_id(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// 📄 One PDF-to-be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderJob {
    pub variant: ReportVariant,
    pub job_id: String,
    pub url: String,
}

impl RenderJob {
    /// 🏗️ Builds the job for a mapped record. The job id is the response id,
    /// sanitized, so a duplicate webhook overwrites instead of piling up.
    pub fn for_record(base_url: &str, record: &SurveyResponseRecord) -> Self {
        Self {
            variant: record.variant,
            job_id: sanitize_job_id(&record.response_id),
            url: report_url(base_url, record),
        }
    }

    /// 📁 `{output_dir}/{job_id}.pdf`. Same job, same path, every time.
    pub fn output_path(&self, output_dir: &Path) -> PathBuf {
        output_dir.join(format!("{}.pdf", self.job_id))
    }
}

/// 🔗 `{base}/?reportOnly=true&athleteName=...&recordedDate=...[&language=..]&<params>`
///
/// Param order is the schema's order. Percentiles arrive already `%`-free from
/// the mapper; everything is form-encoded here.
pub fn report_url(base_url: &str, record: &SurveyResponseRecord) -> String {
    let mut query = url::form_urlencoded::Serializer::new(String::new());
    query.append_pair("reportOnly", "true");
    query.append_pair("athleteName", &record.subject_name);
    query.append_pair("recordedDate", &record.recorded_date);
    if let Some(locale) = record.locale {
        query.append_pair("language", locale.as_str());
    }
    for (param, value) in &record.params {
        query.append_pair(param, value);
    }
    format!("{}/?{}", base_url.trim_end_matches('/'), query.finish())
}

/// 💀 Navigation died, the print failed, the disk said no. All the same to the caller.
#[derive(Debug, Error)]
#[error("💀 failed to render report for job {job_id}: {source:#}")]
pub struct RenderError {
    pub job_id: String,
    #[source]
    pub source: anyhow::Error,
}

impl RenderError {
    pub fn new(job: &RenderJob, source: anyhow::Error) -> Self {
        Self {
            job_id: job.job_id.clone(),
            source,
        }
    }
}

/// 🏊 The concurrency gate in front of the browser.
///
/// A bounded `async-channel` queue drained by a fixed crew of workers. When
/// the crew is busy and the queue is full, `render()` waits its turn instead
/// of launching browser number four hundred. Back-pressure: not glamorous,
/// extremely effective.
#[derive(Debug)]
pub struct RenderPool {
    tx: async_channel::Sender<RenderRequest>,
    handles: Mutex<Vec<JoinHandle<anyhow::Result<()>>>>,
}

impl RenderPool {
    /// 🚀 Spawns `workers` render workers sharing one queue of `queue_capacity`.
    pub fn start(renderer: Arc<dyn ReportRenderer>, workers: usize, queue_capacity: usize) -> Self {
        let (tx, rx) = async_channel::bounded(queue_capacity.max(1));
        let handles = (0..workers.max(1))
            .map(|worker_id| RenderWorker::new(worker_id, rx.clone(), Arc::clone(&renderer)).start())
            .collect();
        debug!(
            "🏊 render pool open: {} worker(s), queue capacity {}",
            workers.max(1),
            queue_capacity.max(1)
        );
        Self {
            tx,
            handles: Mutex::new(handles),
        }
    }

    /// 🗑️ Closes the queue and waits for every worker to finish its current job.
    pub async fn shutdown(&self) {
        self.tx.close();
        let handles = std::mem::take(&mut *self.handles.lock().await);
        for handle in handles {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!("⚠️ render worker exited with an error: {err:#}"),
                Err(join_err) => warn!("⚠️ render worker panicked or was cancelled: {join_err}"),
            }
        }
        debug!("🏁 render pool drained");
    }
}

#[async_trait]
impl ReportRenderer for RenderPool {
    async fn render(&self, job: &RenderJob) -> Result<PathBuf, RenderError> {
        let (reply, reply_rx) = oneshot::channel();
        self.tx
            .send(RenderRequest {
                job: job.clone(),
                reply,
            })
            .await
            .map_err(|_| RenderError::new(job, anyhow!("render pool is closed")))?;
        reply_rx
            .await
            .map_err(|_| RenderError::new(job, anyhow!("render worker dropped the job")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::in_mem::InMemoryRenderer;
    use crate::common::Locale;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn record(response_id: &str) -> SurveyResponseRecord {
        SurveyResponseRecord {
            variant: ReportVariant::Adult,
            response_id: response_id.to_string(),
            subject_name: "Ruby Lee".to_string(),
            email: Some("ruby@example.com".to_string()),
            recorded_date: "2024-01-01".to_string(),
            providers: vec![],
            locale: Some(Locale::Es),
            params: vec![("growthMindsetPercentile", "87".to_string()), ("level", "pro & elite".to_string())],
        }
    }

    #[test]
    fn the_one_where_the_url_is_the_same_every_single_time() {
        let the_first = report_url("https://reports.example.com/", &record("R_1"));
        let the_second = report_url("https://reports.example.com", &record("R_1"));
        assert_eq!(the_first, the_second);
        assert_eq!(
            the_first,
            "https://reports.example.com/?reportOnly=true&athleteName=Ruby+Lee&recordedDate=2024-01-01&language=es&growthMindsetPercentile=87&level=pro+%26+elite"
        );
    }

    #[test]
    fn the_one_where_hostile_job_ids_get_defanged() {
        assert_eq!(sanitize_job_id("R_abc-123"), "R_abc-123");
        assert_eq!(sanitize_job_id("../../etc/passwd"), "______etc_passwd");
        let the_job = RenderJob::for_record("https://x", &record("R/1"));
        assert_eq!(the_job.job_id, "R_1");
        assert_eq!(the_job.output_path(Path::new("out")), PathBuf::from("out/R_1.pdf"));
    }

    /// 🐢 A renderer that counts how many renders are in flight at once.
    #[derive(Debug, Default)]
    struct SlowCountingRenderer {
        in_flight: AtomicUsize,
        high_water: AtomicUsize,
    }

    #[async_trait]
    impl ReportRenderer for SlowCountingRenderer {
        async fn render(&self, job: &RenderJob) -> Result<PathBuf, RenderError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.high_water.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(PathBuf::from(format!("{}.pdf", job.job_id)))
        }
    }

    #[tokio::test]
    async fn the_one_where_the_pool_never_opens_more_browsers_than_it_has_workers() {
        let the_renderer = Arc::new(SlowCountingRenderer::default());
        let the_pool = Arc::new(RenderPool::start(the_renderer.clone(), 2, 4));

        let the_jobs: Vec<_> = (0..8)
            .map(|n| {
                let pool = Arc::clone(&the_pool);
                tokio::spawn(async move {
                    let job = RenderJob::for_record("https://x", &record(&format!("R_{n}")));
                    pool.render(&job).await
                })
            })
            .collect();
        for (n, handle) in the_jobs.into_iter().enumerate() {
            let the_path = handle
                .await
                .expect("💀 join")
                .expect("💀 render should succeed");
            assert_eq!(the_path, PathBuf::from(format!("R_{n}.pdf")));
        }

        assert!(the_renderer.high_water.load(Ordering::SeqCst) <= 2);
        the_pool.shutdown().await;
    }

    #[tokio::test]
    async fn the_one_where_a_closed_pool_says_so() {
        let the_dir = tempfile::tempdir().expect("💀 tempdir");
        let the_pool = RenderPool::start(Arc::new(InMemoryRenderer::new(the_dir.path())), 1, 1);
        the_pool.shutdown().await;

        let the_job = RenderJob::for_record("https://x", &record("R_9"));
        let the_err = the_pool.render(&the_job).await.expect_err("💀 closed pool rendered anyway");
        assert_eq!(the_err.job_id, "R_9");
    }

    #[tokio::test]
    async fn the_one_where_an_abandoned_render_leaves_no_pdf_behind() {
        let the_dir = tempfile::tempdir().expect("💀 tempdir");
        let the_renderer = InMemoryRenderer::new(the_dir.path()).with_delay(Duration::from_millis(100));
        let the_pool = RenderPool::start(Arc::new(the_renderer.clone()), 1, 1);
        let the_job = RenderJob::for_record("https://x", &record("R_late"));

        let the_wait = tokio::time::timeout(Duration::from_millis(10), the_pool.render(&the_job)).await;
        assert!(the_wait.is_err(), "the caller should have given up first");

        the_pool.shutdown().await;
        assert!(the_renderer.jobs.lock().await.len() <= 1);
        assert!(!the_job.output_path(the_dir.path()).exists());
    }
}
