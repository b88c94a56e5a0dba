//! Local status API, polled by the router dashboard.
//!
//! - `GET /api/status`: modem, signal and watchdog snapshot
//! - `GET /api/log?lines=N`: most recent log lines, oldest first
//! - `POST /api/watchdog/enable`, `POST /api/watchdog/disable`
//!
//! Reads are served from the last published snapshot and never wait for the
//! watchdog loop.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tokio::net::TcpListener;

use modem_doctor_engine::{LinkProbe, ModemControl};

use crate::AgentState;

/// Log lines returned when the request does not say.
pub const DEFAULT_LOG_LINES: usize = 30;

pub fn router<P: LinkProbe, M: ModemControl>(state: Arc<AgentState<P, M>>) -> Router {
    Router::new()
        .route("/api/status", get(api_status::<P, M>))
        .route("/api/log", get(api_log::<P, M>))
        .route("/api/watchdog/enable", post(api_enable::<P, M>))
        .route("/api/watchdog/disable", post(api_disable::<P, M>))
        .layer(tower_http::cors::CorsLayer::permissive())
        .with_state(state)
}

/// Serve the API on an already bound listener until the task is dropped.
pub async fn serve<P: LinkProbe, M: ModemControl>(
    state: Arc<AgentState<P, M>>,
    listener: TcpListener,
) -> anyhow::Result<()> {
    let app = router(state);
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("status API on http://{addr}");
    }
    axum::serve(listener, app).await?;
    Ok(())
}

// ── GET /api/status ─────────────────────────────────────────────────

async fn api_status<P: LinkProbe, M: ModemControl>(
    State(state): State<Arc<AgentState<P, M>>>,
) -> Json<serde_json::Value> {
    let report = state.status.status();
    Json(serde_json::json!({
        "modem": report.modem,
        "signal": report.signal,
        "watchdog": report.watchdog,
        "simulate": state.simulate,
    }))
}

// ── GET /api/log ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct LogQuery {
    lines: Option<usize>,
}

async fn api_log<P: LinkProbe, M: ModemControl>(
    State(state): State<Arc<AgentState<P, M>>>,
    Query(query): Query<LogQuery>,
) -> Json<serde_json::Value> {
    let lines = query.lines.unwrap_or(DEFAULT_LOG_LINES);
    Json(serde_json::json!({
        "log": state.status.log_lines(lines),
    }))
}

// ── POST /api/watchdog/{enable,disable} ─────────────────────────────

async fn api_enable<P: LinkProbe, M: ModemControl>(
    State(state): State<Arc<AgentState<P, M>>>,
) -> Json<serde_json::Value> {
    let changed = state.watchdog.lock().await.enable();
    tracing::info!(changed, "watchdog enabled via API");
    Json(serde_json::json!({
        "enabled": true,
        "changed": changed,
    }))
}

async fn api_disable<P: LinkProbe, M: ModemControl>(
    State(state): State<Arc<AgentState<P, M>>>,
) -> Json<serde_json::Value> {
    let mut watchdog = state.watchdog.lock().await;
    let changed = watchdog.is_enabled();
    watchdog.disable().await;
    tracing::info!(changed, "watchdog disabled via API");
    Json(serde_json::json!({
        "enabled": false,
        "changed": changed,
    }))
}
