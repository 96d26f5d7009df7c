use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::State,
    response::Html,
    routing::get,
    Json, Router,
};
use log::info;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use super::refresher::{DashboardState, Snapshot};

const PAGE_TEMPLATE: &str = include_str!("page.html");

#[derive(Clone)]
pub struct AppState {
    dashboard: DashboardState,
    page: Arc<String>,
}

impl AppState {
    pub fn new(dashboard: DashboardState, title: &str, refresh_interval_ms: u64) -> Self {
        Self {
            dashboard,
            page: Arc::new(render_page(title, refresh_interval_ms)),
        }
    }
}

fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn render_page(title: &str, refresh_interval_ms: u64) -> String {
    PAGE_TEMPLATE
        .replace("{{TITLE}}", &escape_html(title))
        .replace("{{REFRESH_MS}}", &refresh_interval_ms.to_string())
}

async fn index(State(state): State<AppState>) -> Html<String> {
    Html(state.page.as_ref().clone())
}

async fn window(State(state): State<AppState>) -> Json<Snapshot> {
    Json(state.dashboard.snapshot())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/window", get(window))
        .with_state(state)
}

/// Serves the dashboard until `cancel_token` fires.
pub async fn serve(
    bind_address: String,
    state: AppState,
    cancel_token: CancellationToken,
) -> Result<()> {
    let listener = TcpListener::bind(bind_address.as_str())
        .await
        .with_context(|| format!("failed to bind dashboard on {bind_address}"))?;
    let local_addr = listener
        .local_addr()
        .context("failed to read dashboard listen address")?;
    info!("Dashboard listening on http://{local_addr}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { cancel_token.cancelled().await })
        .await
        .context("dashboard server failed")
}
