//! ⏳ Settle waits: "is the page done yet?" asked politely, repeatedly, with
//! a hard deadline.
//!
//! Two questions, both answered by polling a probe:
//! - Images: are they loaded? All of them within the full window → great.
//!   Most of them within the partial window → good enough. Neither → sleep a
//!   fixed delay and print whatever we've got.
//! - Network: is `document.readyState` complete and has the resource count
//!   stopped moving for the idle window? If not by the timeout, we proceed anyway.
//!
//! ⚠️ Every probe runs under the window's remaining time. A probe that never
//! answers costs us the window, not the whole render.

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;
use tokio::time::{Instant, sleep, timeout};
use tracing::debug;

/// 🖼️ What the image probe reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ImageStatus {
    pub total: u32,
    pub loaded: u32,
}

impl ImageStatus {
    pub fn all_loaded(&self) -> bool {
        self.loaded >= self.total
    }

    /// 📐 No images counts as fully loaded. Vacuous truth, but useful.
    pub fn loaded_ratio(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            f64::from(self.loaded) / f64::from(self.total)
        }
    }
}

/// 🌐 What the network probe reports.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NetworkStatus {
    #[serde(rename = "readyState")]
    pub ready_state: String,
    pub resources: u64,
}

#[derive(Debug, Clone)]
pub struct ImageSettlePolicy {
    pub full_timeout: Duration,
    pub partial_timeout: Duration,
    pub partial_ratio: f64,
    pub fallback_delay: Duration,
    pub poll_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct NetworkIdlePolicy {
    pub timeout: Duration,
    pub idle_window: Duration,
    pub poll_interval: Duration,
}

/// 🏁 Which rung of the ladder the image wait stopped on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleOutcome {
    AllLoaded,
    MostlyLoaded,
    FixedDelay,
}

/// 🔁 Poll `probe` every `interval` until `done` says yes or `window` runs out.
/// Probe errors are logged and polled through.
async fn poll_until<T, F, Fut, P>(
    window: Duration,
    interval: Duration,
    probe: &mut F,
    mut done: P,
) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: FnMut(&T) -> bool,
{
    let deadline = Instant::now() + window;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return false;
        }
        match timeout(remaining, probe()).await {
            Ok(Ok(status)) if done(&status) => return true,
            Ok(Ok(_)) => {}
            Ok(Err(err)) => debug!("🔍 settle probe failed, polling on: {err:#}"),
            Err(_) => return false,
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return false;
        }
        sleep(interval.min(remaining)).await;
    }
}

/// 🖼️ The three-rung image wait.
pub async fn settle_images<F, Fut>(policy: &ImageSettlePolicy, mut probe: F) -> SettleOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<ImageStatus>>,
{
    if poll_until(policy.full_timeout, policy.poll_interval, &mut probe, ImageStatus::all_loaded).await {
        return SettleOutcome::AllLoaded;
    }
    let ratio = policy.partial_ratio;
    if poll_until(policy.partial_timeout, policy.poll_interval, &mut probe, |status: &ImageStatus| {
        status.loaded_ratio() >= ratio
    })
    .await
    {
        return SettleOutcome::MostlyLoaded;
    }
    sleep(policy.fallback_delay).await;
    SettleOutcome::FixedDelay
}

/// 🌐 True once the page went quiet, false if the timeout won.
pub async fn wait_for_network_idle<F, Fut>(policy: &NetworkIdlePolicy, mut probe: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<NetworkStatus>>,
{
    let mut quiet_since: Option<(u64, Instant)> = None;
    poll_until(policy.timeout, policy.poll_interval, &mut probe, |status: &NetworkStatus| {
        if status.ready_state != "complete" {
            quiet_since = None;
            return false;
        }
        let now = Instant::now();
        match quiet_since {
            Some((count, since)) if count == status.resources => {
                now.duration_since(since) >= policy.idle_window
            }
            _ => {
                quiet_since = Some((status.resources, now));
                false
            }
        }
    })
    .await
}
