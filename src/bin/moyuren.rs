//! Daily calendar bot binary.
//!
//! Loads the TOML config and the recipient settings file, wires the HTTP
//! calendar producer to the webhook sender, starts the scheduler and runs
//! until Ctrl-C.

use moyuren::{BotConfig, HttpCalendarProducer, Scheduler, SettingsStore, WebhookSender};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("moyuren=info")),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .or_else(BotConfig::default_path)
        .ok_or_else(|| anyhow::anyhow!("no config path given and no default available"))?;
    let config = BotConfig::load_or_default(&config_path)?;
    tracing::info!("loaded config from {}", config_path.display());

    let mut settings = match config.settings_path() {
        Some(path) => SettingsStore::new(path),
        None => SettingsStore::in_memory(),
    };
    settings.load();

    let producer = Arc::new(HttpCalendarProducer::new(&config.content)?);
    let sender = Arc::new(WebhookSender::new(&config.delivery)?);

    let scheduler = Scheduler::new(settings, producer, sender, &config.scheduler);
    scheduler.start()?;
    tracing::info!("moyuren running, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    scheduler.stop().await;
    Ok(())
}
