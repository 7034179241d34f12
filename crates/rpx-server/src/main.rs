//! 🚀 rpx-server: the front door, the bouncer, the maitre d' of rpx.
//!
//! 🎬 *[narrator voice]* "It all started with a simple main() function..."
//! 📦 Thin wrapper: parse flags, set up logging, load config, then let the
//! library do the heavy lifting. Like a manager. 🦆

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// 📄 Turns survey webhooks into PDF reports and emails the links.
#[derive(Debug, Parser)]
#[command(name = "rpx-server", version)]
struct Args {
    /// 🔧 TOML config file, merged over RPX_* environment variables.
    #[arg(short, long, env = "RPX_CONFIG")]
    config: Option<PathBuf>,

    /// 🚪 Listen port. Overrides server.port.
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,
}

/// 🚀 main(): the "I pressed F5 and held my breath" moment.
///
/// 🔧 Steps:
/// 1. Init tracing (so we can see what goes wrong, and when)
/// 2. Parse args
/// 3. Load config (the moment of truth)
/// 4. Serve until told to stop
/// 5. Handle errors (cry, then exit 1)
#[tokio::main]
async fn main() -> Result<()> {
    // 📡 RUST_LOG wins; otherwise info. println! debugging is a lifestyle we're moving past.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    // 🔒 Make sure the file exists before we get emotionally attached
    if let Some(path) = &args.config {
        let exists = path.try_exists().with_context(|| {
            format!("💀 Couldn't check whether the config file exists at '{}'", path.display())
        })?;
        if !exists {
            anyhow::bail!(
                "💀 Config file '{}' does not exist. If it's a relative path, check your working directory, or use an absolute path to be absolutely certain.",
                path.display()
            );
        }
    }

    let mut app_config = rpx::app_config::load_config(args.config.as_deref())
        .context("💀 In rpx-server, main, we couldn't load the config. Take a look at the file and the RPX_* environment.")?;
    if let Some(port) = args.port {
        app_config.server.port = port;
    }

    // 🚀 SEND IT.
    let result = rpx::run(app_config).await;

    if let Err(err) = result {
        error!("💀 error: {}", err);
        // -- 🧅 peel the onion, one layer at a time
        let mut the_vibes_are_giving_connection_issues = false;
        for cause in err.chain().skip(1) {
            error!("⚠️  cause: {}", cause);
            let cause_str = cause.to_string();
            if cause_str.contains("error sending request")
                || cause_str.contains("connection refused")
                || cause_str.contains("Connection refused")
                || cause_str.contains("tcp connect error")
                || cause_str.contains("dns error")
                || cause_str.contains("Address already in use")
            {
                the_vibes_are_giving_connection_issues = true;
            }
        }

        if the_vibes_are_giving_connection_issues {
            error!(
                "🔧 hint: looks like something isn't reachable. Check that the WebDriver \
                (chromedriver / selenium) is running at renderer.webdriver_url, that the \
                port is free, and that outbound HTTPS works. If you're using Docker, \
                `docker ps` is your friend. ☕"
            );
        }

        std::process::exit(1);
    }

    Ok(())
}
