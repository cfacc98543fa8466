//! Router assembly and the listening loop.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::{Json, Router, routing::get};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;

use super::commands::AlarmCommand;
use super::v0;
use crate::alarm::AlarmRecord;
use crate::api_client::types::RingStatus;
use crate::service::ServiceChannels;
use crate::tracing::prelude::*;

#[derive(OpenApi)]
#[openapi(
    info(title = "clamor", description = "Noise-gated alarm clock"),
    tags(
        (name = "health", description = "Liveness"),
        (name = "alarms", description = "Alarm management"),
        (name = "ringing", description = "The ringing alarm"),
    ),
)]
struct ApiDoc;

/// State shared by all handlers.
#[derive(Clone)]
pub struct SharedState {
    pub alarm_cmd_tx: mpsc::Sender<AlarmCommand>,
    alarms_rx: watch::Receiver<Vec<AlarmRecord>>,
    ringing_rx: watch::Receiver<RingStatus>,
}

impl SharedState {
    pub fn alarms(&self) -> Vec<AlarmRecord> {
        self.alarms_rx.borrow().clone()
    }

    pub fn ring_status(&self) -> RingStatus {
        self.ringing_rx.borrow().clone()
    }
}

impl From<ServiceChannels> for SharedState {
    fn from(channels: ServiceChannels) -> Self {
        Self {
            alarm_cmd_tx: channels.commands,
            alarms_rx: channels.alarms,
            ringing_rx: channels.ringing,
        }
    }
}

/// The full application: v0 routes plus the OpenAPI document.
pub fn router(state: SharedState) -> Router {
    let (v0_router, v0_doc) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .nest("/api/v0", v0::routes())
        .split_for_parts();

    v0_router
        .route("/api/openapi.json", get(move || async move { Json(v0_doc) }))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the API on `addr` until `shutdown` is cancelled.
pub async fn serve(
    addr: SocketAddr,
    state: SharedState,
    shutdown: CancellationToken,
) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding API listener on {addr}"))?;
    info!(%addr, "API listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("API server failed")?;

    debug!("API server stopped");
    Ok(())
}
