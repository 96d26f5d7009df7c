use std::sync::Arc;

use anyhow::{Context, Result};
use log::{info, warn};
use tokio_util::sync::CancellationToken;

use crate::{
    dashboard::{refresh_loop, serve, AppState, DashboardState, WindowReader},
    db::open_store,
    sensing::{Sampler, SamplerController, Sensor},
    settings::Settings,
};

/// Samples `sensor` into the store until `cancel_token` fires.
pub async fn run_collector(
    settings: &Settings,
    sensor: Arc<dyn Sensor>,
    cancel_token: CancellationToken,
) -> Result<()> {
    let store = open_store(&settings.store)?;
    info!("Collector writing to {}", settings.store.describe());

    let sampler = Sampler::new(
        sensor,
        store,
        &settings.sampler,
        settings.store.operation_timeout(),
    );

    let mut controller = SamplerController::new();
    controller.start_sampling(
        sampler,
        settings.sampler.interval(),
        settings.sampler.max_backoff(),
    )?;

    cancel_token.cancelled().await;

    let stats = controller.stop_sampling().await?;
    info!(
        "Collector stopped: {} readings committed, {} cycles failed, {} appends unconfirmed",
        stats.committed, stats.failed, stats.uncertain
    );
    Ok(())
}

/// Refreshes the window and serves the dashboard until `cancel_token` fires.
pub async fn run_dashboard(settings: &Settings, cancel_token: CancellationToken) -> Result<()> {
    let store = open_store(&settings.store)?;
    info!("Dashboard reading from {}", settings.store.describe());

    let dashboard = &settings.dashboard;
    let reader = WindowReader::new(
        store,
        dashboard.window_size,
        settings.store.operation_timeout(),
    );
    let state = DashboardState::new(dashboard.window_size);

    let refresher = tokio::spawn(refresh_loop(
        reader,
        state.clone(),
        dashboard.refresh_interval(),
        cancel_token.clone(),
    ));

    let app_state = AppState::new(state, &dashboard.title, dashboard.refresh_interval_ms);
    let served = serve(dashboard.bind_address(), app_state, cancel_token.clone()).await;

    // The server may have failed on its own; stop the refresher either way.
    cancel_token.cancel();
    refresher
        .await
        .context("refresh loop task failed to join")?;
    served
}

/// Cancels `cancel_token` on Ctrl-C or SIGTERM.
pub async fn shutdown_on_signal(cancel_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!("Failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Ctrl-C received, shutting down"),
        _ = terminate => info!("SIGTERM received, shutting down"),
        _ = cancel_token.cancelled() => return,
    }
    cancel_token.cancel();
}
