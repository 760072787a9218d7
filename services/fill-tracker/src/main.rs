//! Fill tracker daemon
//!
//! Long-running process: no CLI surface, all settings from the environment.

use anyhow::Result;
use fill_tracker::FillTracker;
use fill_tracker::config::TrackerConfig;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fill_tracker=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting fill tracker");

    let config = TrackerConfig::from_env()?;
    let tracker = FillTracker::connect(config).await?;
    tracker.run().await?;

    Ok(())
}
