use std::time::Duration;

use bedrock_process::ProcessState;
use bedrock_supervisor::{EventBus, Supervisor, SupervisorConfig};
use tokio::sync::broadcast;

mod config;
mod properties;
mod telegram;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let bds_dir = config::bds_dir();
    let check = config::validate_bds_dir(&bds_dir);
    if !check.valid {
        tracing::warn!(dir = %bds_dir.display(), "{}", check.message);
    }

    let props_path = bds_dir.join("server.properties");
    match properties::ServerProperties::load(&props_path) {
        Ok(mut props) => {
            // Settings edits are written back before the server launches so
            // it picks them up on this run.
            if let Ok(overrides) = std::env::var("BEDROCK_PROPERTY_OVERRIDES")
                && props.apply_overrides(&overrides) > 0
            {
                match props.save(&props_path) {
                    Ok(()) => tracing::info!("server.properties updated from overrides"),
                    Err(err) => tracing::warn!(error = %err, "failed to write server.properties"),
                }
            }
            tracing::info!(
                name = props.get("server-name").unwrap_or("unknown"),
                port = props.get("server-port").unwrap_or("19132"),
                "server properties loaded"
            );
            for (key, value) in props.entries() {
                tracing::debug!(target: "properties", "{key}={value}");
            }
        }
        Err(err) => tracing::warn!(error = %err, "server.properties not readable"),
    }

    let bus = EventBus::default();
    let supervisor = Supervisor::new(SupervisorConfig::new(&bds_dir), bus.clone());

    telegram::TelegramNotifier::new(telegram::TelegramConfig::from_env()).spawn(&bus);

    // Relay console lines into the panel log.
    let mut output_rx = bus.subscribe_output();
    tokio::spawn(async move {
        loop {
            match output_rx.recv().await {
                Ok(line) => tracing::info!(target: "console", "{line}"),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let outcome = supervisor.start().await;
    if !outcome.started {
        tracing::error!(message = ?outcome.message, "server did not start");
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");

    let mut status_rx = bus.subscribe_status();
    if supervisor.stop().await.stopped {
        let _ = tokio::time::timeout(Duration::from_secs(30), async {
            loop {
                match status_rx.recv().await {
                    Ok(ProcessState::Stopped) => break,
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
        .await;
    }

    Ok(())
}
