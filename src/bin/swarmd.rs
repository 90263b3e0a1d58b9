//! Thin daemon entry point: boots the coordination plane and drives its
//! governed maintenance loop until an end state is reached. No subcommand
//! CLI surface — task submission and inspection are a client concern
//! against the same SQLite store or the sync HTTP API.

use std::time::Duration;

use abathur_swarm::CoordinationPlane;
use anyhow::{Context, Result};

#[tokio::main]
async fn main() -> Result<()> {
    let plane = CoordinationPlane::bootstrap().await.map_err(|e| anyhow::anyhow!(e)).context("failed to bootstrap coordination plane")?;

    tracing::info!(
        database = %plane.config.store.database_path,
        sync_enabled = plane.sync.is_some(),
        "coordination plane booted"
    );

    let poll_interval = Duration::from_millis(500);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown signal received");
                plane.governor.request_stop();
            }
            _ = tokio::time::sleep(poll_interval) => {}
        }

        if let Err(err) = plane.run_maintenance_cycle().await {
            tracing::error!(%err, "maintenance cycle failed");
        }

        if let Some(end_state) = plane.evaluate_end_state(false).await? {
            tracing::info!(end_state = end_state.as_str(), "coordination plane stopping");
            break;
        }
    }

    Ok(())
}
