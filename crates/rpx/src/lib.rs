//! 📄 rpx: survey webhook in, PDF report out, link in an inbox.
//!
//! 🧠 Knowledge graph:
//! - `server` takes the webhook and acks it.
//! - `pipeline` runs fetch → map → render → upload → notify.
//! - `mapper` turns raw survey values into a report record.
//! - `render` + `workers` gate the headless browser.
//! - `store` parks the PDF and signs a link.
//! - `notify` emails the link and tells chat about it.
//! - `backends` is every external system, real and in-memory.

pub mod app_config;
pub mod backends;
pub mod common;
pub mod mapper;
pub mod notify;
pub mod pipeline;
pub mod render;
pub mod server;
pub mod store;
mod workers;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::app_config::AppConfig;
use crate::pipeline::Pipeline;

/// 🚀 Build every backend, serve until a shutdown signal, drain the render pool.
pub async fn run(app_config: AppConfig) -> Result<()> {
    let (pipeline, render_pool) = Pipeline::from_config(&app_config)
        .await
        .context("💀 Failed to build the pipeline backends")?;
    let served = server::serve(&app_config.server, Arc::new(pipeline)).await;
    info!("🏊 draining the render pool");
    render_pool.shutdown().await;
    served
}
