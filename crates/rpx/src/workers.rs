//! 🧵 Workers: the ones who actually do the work while the pipeline takes all
//! the credit in the sprint retro.
//!
//! ⚠️ Workers are private little minions. The outside world talks to the
//! [`RenderPool`](crate::render::RenderPool), never to a worker directly.

use anyhow::Result;
use tokio::task::JoinHandle;

pub(crate) mod render_worker;

/// 🏗️ A background worker, that does work. duh.
pub(crate) trait Worker {
    /// 🚀 Start the worker. Returns a JoinHandle because we trust
    /// but verify. Mostly verify.
    fn start(self) -> JoinHandle<Result<()>>;
}
