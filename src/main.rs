use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rustbot_dispatch::config::Config;
use rustbot_dispatch::{Bot, Context, ExitCodeReporter, Next};

/// Logs every update and echoes text messages back.
async fn echo(ctx: Context, next: Next) -> Result<()> {
    info!(
        "Update {} ({:?}) for @{}",
        ctx.update_id(),
        ctx.update_kind(),
        ctx.bot_info().username
    );

    let text = ctx
        .update()
        .payload
        .get("message")
        .and_then(|m| m.get("text"))
        .and_then(|t| t.as_str())
        .map(str::to_owned);

    if let Some(text) = text {
        ctx.reply(&text).await?;
    }

    next.run(ctx).await
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,rustbot_dispatch=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Mode: {}", config.mode());
    info!("  Handler timeout: {:?}", config.handler_timeout());
    info!("  Webhook reply: {}", config.telegram.webhook_reply);

    let reporter = ExitCodeReporter::global();
    let bot = Bot::new(
        config.telegram.bot_token.clone(),
        echo,
        config.bot_options(Arc::new(reporter.clone())),
    );

    info!("Bot is starting...");
    bot.launch(config.launch_options())
        .await
        .context("Failed to launch bot")?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    if let Err(e) = bot.stop("SIGINT").await {
        warn!("Bot was not running at shutdown: {}", e);
    }

    Ok(reporter.exit_code())
}
