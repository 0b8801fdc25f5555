//! irccd entry point: load configuration, connect every server, run the
//! dispatch loop until interrupted.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::Mutex;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use irccd::bot::Bot;
use irccd::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "irccd.toml".to_string());

    // A bare default filter so we can report config-loading failures before
    // the configured log level is known.
    tracing_subscriber::fmt().with_env_filter(EnvFilter::new("info")).init();

    let config = Config::from_file(&config_path).with_context(|| format!("failed to load config from {config_path}"))?;

    info!(path = %config_path, "configuration loaded");

    let admin_config = config.admin.clone();

    let bot = Bot::from_config(config).await.context("failed to build bot from configuration")?;
    let bot = Arc::new(Mutex::new(bot));

    let run_handle = {
        let bot = bot.clone();
        tokio::spawn(async move {
            bot.lock().await.run().await;
        })
    };

    if let Some(admin_config) = admin_config {
        let bot = bot.clone();
        tokio::spawn(async move {
            if let Err(e) = irccd::admin::serve(&admin_config.address, admin_config.port, bot).await {
                error!(error = %e, "admin interface exited");
            }
        });
    }

    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("received shutdown signal");
        }
        result = run_handle => {
            if let Err(e) = result {
                error!(error = %e, "dispatch task exited unexpectedly");
            }
        }
    }

    bot.lock().await.shutdown().await;
    info!("shut down");
    Ok(())
}
