use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use log::{info, warn};

use cabinwatch::{Broadcaster, Database, DetectionConfig, TrackerController};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("cabinwatch starting up...");

    let config_path = std::env::var("CABINWATCH_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("cabinwatch.json"));
    let config = DetectionConfig::load_or_default(&config_path);

    let db_path = std::env::var("CABINWATCH_DB")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("cabinwatch.sqlite3"));
    let database = Database::new(db_path)?;

    // Close out sessions that were open when the service last stopped.
    for record in database
        .recover_open_sessions(Utc::now(), config.min_session_secs)
        .await?
    {
        warn!(
            "Recovered open session on cabin {} ({}s); recorded and reset",
            record.cabin_no, record.duration
        );
    }

    let broadcaster = Arc::new(Broadcaster::new(config.broadcast_buffer));

    // Mirror every state change into the service log until an external
    // listener transport is wired up.
    let (_listener_id, mut updates) = broadcaster.subscribe();
    tokio::spawn(async move {
        while let Some(message) = updates.recv().await {
            info!("cabin update: {message}");
        }
    });

    let tracker = TrackerController::new(database, Arc::clone(&broadcaster), config);
    tracker.start().await?;

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    tracker.stop().await?;

    Ok(())
}
