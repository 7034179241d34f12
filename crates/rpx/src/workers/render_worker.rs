//! 🎬 *[a queue fills with render jobs. somewhere, a browser waits.]*
//!
//! 🖨️ The RenderWorker: pulls one job off the queue, hands it to the real
//! renderer, mails the result back through a oneshot, repeat until the queue
//! closes. It does not retry. It does not judge. It prints.
//! If the caller stops waiting, the worker cleans up after itself.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use async_channel::Receiver;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::Worker;
use crate::backends::ReportRenderer;
use crate::render::{RenderError, RenderJob};

/// 📨 A job plus the return address for its result.
#[derive(Debug)]
pub(crate) struct RenderRequest {
    pub job: RenderJob,
    pub reply: oneshot::Sender<Result<PathBuf, RenderError>>,
}

#[derive(Debug)]
pub(crate) struct RenderWorker {
    worker_id: usize,
    rx: Receiver<RenderRequest>,
    renderer: Arc<dyn ReportRenderer>,
}

impl RenderWorker {
    pub(crate) fn new(
        worker_id: usize,
        rx: Receiver<RenderRequest>,
        renderer: Arc<dyn ReportRenderer>,
    ) -> Self {
        Self {
            worker_id,
            rx,
            renderer,
        }
    }
}

impl Worker for RenderWorker {
    fn start(self) -> JoinHandle<Result<()>> {
        tokio::spawn(async move {
            debug!("🖨️ RenderWorker {} reporting for duty", self.worker_id);
            loop {
                match self.rx.recv().await {
                    Ok(request) => {
                        if request.reply.is_closed() {
                            debug!(
                                "👻 RenderWorker {}: caller for job {} left before it started. Skipped.",
                                self.worker_id, request.job.job_id
                            );
                            continue;
                        }
                        debug!(
                            "🖨️ RenderWorker {} picked up job {}",
                            self.worker_id, request.job.job_id
                        );
                        let result = self.renderer.render(&request.job).await;
                        if let Err(Ok(orphan)) = request.reply.send(result) {
                            // -- the caller hung up mid-render. nobody will upload this PDF, so nobody keeps it.
                            debug!(
                                "👻 RenderWorker {}: caller for job {} is gone. Removing {}",
                                self.worker_id,
                                request.job.job_id,
                                orphan.display()
                            );
                            if let Err(err) = tokio::fs::remove_file(&orphan).await {
                                warn!("⚠️ could not remove orphaned report {}: {err}", orphan.display());
                            }
                        }
                    }
                    Err(_) => {
                        // Channel is empty and closed
                        debug!("🏁 RenderWorker {}: queue closed. Shutting down.", self.worker_id);
                        return Ok(());
                    }
                }
            }
        })
    }
}
