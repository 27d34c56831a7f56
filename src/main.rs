use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use piazza_pending_notifier::config::{Config, DEFAULT_CONFIG_PATH};
use piazza_pending_notifier::forum::{ForumClient, PiazzaClient};
use piazza_pending_notifier::notify::WebhookNotifier;
use piazza_pending_notifier::poll_loop;
use piazza_pending_notifier::throttle::FixedDelay;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    init_tracing()?;

    let config_path = config_path_from_args()?;

    info!("Starting piazza-pending-notifier");

    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;
    config.validate().context("Invalid configuration")?;

    info!(
        course_id = %config.course_id,
        check_interval_secs = config.check_interval.as_secs(),
        min_age_minutes = config.min_age.num_minutes(),
        max_age_minutes = config.max_age.num_minutes(),
        "Configuration loaded"
    );

    let forum = PiazzaClient::new(config.api_url()?, config.course_id.clone())
        .context("Failed to build Piazza client")?;
    forum
        .login(&config.email, &config.password)
        .await
        .context("Failed to log in to Piazza")?;
    info!(course_id = %forum.course_id(), "Watching course");

    let notifier = WebhookNotifier::new(config.webhook_url()?, config.webhook_username.clone())
        .context("Failed to build webhook client")?;
    let throttle = FixedDelay::new(config.detail_fetch_delay);

    tokio::select! {
        () = poll_loop(&forum, &throttle, &notifier, &config) => {},
        () = shutdown_signal() => {
            info!("Shutting down...");
        },
    }

    Ok(())
}

fn config_path_from_args() -> Result<PathBuf> {
    let mut args = std::env::args();
    let program = args
        .next()
        .unwrap_or_else(|| "piazza-pending-notifier".to_string());

    match (args.next(), args.next()) {
        (None, _) => Ok(PathBuf::from(DEFAULT_CONFIG_PATH)),
        (Some(path), None) => Ok(PathBuf::from(path)),
        (Some(_), Some(_)) => {
            anyhow::bail!("usage: {program} [configuration_file_path]")
        }
    }
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,piazza_pending_notifier=debug"));

    // Check if JSON logging is requested
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| matches!(v.to_lowercase().as_str(), "json" | "structured"))
        .unwrap_or(false);

    if use_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
