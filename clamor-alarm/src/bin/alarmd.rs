//! The clamor alarm daemon.
//!
//! Loads alarms, starts the alarm service and the HTTP API, and runs
//! until interrupted. Configuration comes from `CLAMOR_*` environment
//! variables; see [`Config`].

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use clamor_alarm::{
    api::{self, SharedState},
    audio,
    clock::SystemClock,
    config::Config,
    service::AlarmService,
    store::{AlarmStore, FileBlobStore},
    tracing::{self, prelude::*},
};

fn main() -> Result<()> {
    tracing::init_journald_or_stdout();

    // Everything is cooperative; one thread is plenty.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building runtime")?;

    runtime.block_on(run())
}

async fn run() -> Result<()> {
    let config = Config::from_env()?;
    info!(
        data_dir = %config.data_dir.display(),
        capture = %config.capture_backend,
        sound = %config.sound_asset.display(),
        "Starting clamor"
    );

    let blob = FileBlobStore::open(&config.data_dir)
        .with_context(|| format!("opening data directory {}", config.data_dir.display()))?;
    let mut store = AlarmStore::new(blob);
    store.load();

    let capture = audio::capture_device(config.capture_backend, &config.noise_gate);
    let (service, channels) = AlarmService::new(
        &config,
        store,
        capture,
        audio::default_player(),
        Arc::new(SystemClock),
    );

    let shutdown = CancellationToken::new();
    let service_task = tokio::spawn(service.run(shutdown.clone()));
    let api_task = tokio::spawn({
        let state = SharedState::from(channels);
        let shutdown = shutdown.clone();
        async move {
            let result = api::serve(config.api_listen, state, shutdown.clone()).await;
            // API exit ends the daemon.
            shutdown.cancel();
            result
        }
    });

    tokio::select! {
        _ = wait_for_signal() => {
            info!("Shutting down");
        }
        _ = shutdown.cancelled() => {}
    }
    shutdown.cancel();

    if let Err(e) = service_task.await {
        error!(error = %e, "Alarm service task failed");
    }
    api_task.await.context("API task failed")??;

    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            warn!(error = %e, "Cannot listen for SIGTERM");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
