//! warnwatch server
//!
//! Run with: cargo run
//!
//! Environment variables:
//! - WARNWATCH_HOST: Bind address (default: 0.0.0.0)
//! - WARNWATCH_PORT: Port number (default: 8065)
//! - WARNWATCH_DATA_FILE: JSON file for warn metric state (default: in-memory)
//! - WARNWATCH_CHECK_INTERVAL_SECS: Job wake-up interval (default: 3600)
//! - WARNWATCH_JOB_WAIT_MS: Minimum time between check cycles (default: 7 days)
//! - WARNWATCH_DISPATCH_FAILURE_POLICY: keep | rollback (default: keep)
//! - WARNWATCH_ADMIN_CHANNEL: Channel for bot messages (default: town-square)
//! - WARNWATCH_RENEWAL_EMAIL: Recipient for email metrics
//! - WARNWATCH_BOT_WEBHOOK_URL / WARNWATCH_EMAIL_WEBHOOK_URL: Delivery webhooks
//! - WARNWATCH_SITE_NAME / WARNWATCH_SITE_URL: Used in notification texts
//! - RUST_LOG: Log level (default: info)

use warnwatch::api::{run_server, ServerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warnwatch=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env();

    tracing::info!("warnwatch configuration:");
    tracing::info!("  Host: {}:{}", config.host, config.port);
    match &config.data_file {
        Some(path) => tracing::info!("  Data file: {}", path.display()),
        None => tracing::info!("  Data file: none (in-memory)"),
    }
    tracing::info!(
        "  Check interval: {} seconds",
        config.alerts.check_interval.as_secs()
    );
    tracing::info!(
        "  Job wait time: {} hours",
        config.alerts.job_wait_ms / (1000 * 3600)
    );
    tracing::info!(
        "  Dispatch failure policy: {:?}",
        config.alerts.failure_policy
    );
    tracing::info!(
        "  Admin channel: {}",
        config.alerts.notifications.admin_channel
    );
    if config.alerts.notifications.bot_webhook_url.is_none()
        && config.alerts.notifications.email_webhook_url.is_none()
    {
        tracing::info!("  Delivery: log only (no webhooks configured)");
    }

    println!(
        r#"
 warnwatch - warn metric monitoring
 Version: {}
"#,
        env!("CARGO_PKG_VERSION")
    );

    run_server(config).await
}
