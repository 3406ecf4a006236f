pub mod api;
pub mod clock;
pub mod config;
pub mod db;
pub mod export;
pub mod machine;
pub mod production;

use std::sync::Arc;

use anyhow::{Context, Result};
use log::{info, warn};

use api::AppState;
use clock::{DisplayZone, SystemClock};
use config::{AppConfig, Cli};
use db::Database;
use machine::MachineController;
use production::{RandomThroughput, Sampler};

pub async fn run(cli: Cli) -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("packline starting up...");

    let config = AppConfig::load(&cli)?;
    let zone = DisplayZone::from_offset_minutes(config.utc_offset_minutes)?;
    let database = Database::new(config.database_path.clone())?;

    let controller = MachineController::new(
        config.machine.clone(),
        config.window_capacity,
        zone,
        Arc::new(SystemClock),
        database.clone(),
    );

    // Pick up a run that was in progress when the process last stopped.
    match controller.recover().await {
        Ok(true) => warn!("Recovered in-progress run from {}", database.path().display()),
        Ok(false) => {}
        Err(err) => warn!("Ignoring unusable saved run state: {err:?}"),
    }

    let mut sampler = Sampler::new();
    sampler.start(
        controller.clone(),
        Box::new(RandomThroughput::new(
            config.min_units_per_sample,
            config.max_units_per_sample,
            config.expected_units_per_sample,
        )),
        config.sample_interval(),
    )?;

    let app = api::build_router(Arc::new(AppState {
        controller,
        db: database,
        history_limit: config.history_limit,
    }));

    let listener = tokio::net::TcpListener::bind(&config.listen)
        .await
        .with_context(|| format!("failed to bind {}", config.listen))?;
    info!("Server running on http://{}", config.listen);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    sampler.stop().await?;
    info!("packline stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
}
