// Copyright (C) 2026  winnyboy5
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.
//! HTTP endpoint for Prometheus scrapes
//!
//! Provides the Axum router exposing `/metrics` in Prometheus text exposition
//! format, and the serving loop the collector runs in the background.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use prometheus::{Encoder, Registry, TextEncoder};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Progress of the serving loop, published over a watch channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ServeState {
    /// Not bound yet
    Pending,
    /// Accepting scrapes on the given address
    Listening(SocketAddr),
    /// The loop ended on its own; nothing is bound
    Failed(String),
    /// The loop ended after shutdown was requested; `Some` carries the error
    Closed(Option<String>),
}

impl ServeState {
    pub(crate) fn is_terminal(&self) -> bool {
        matches!(self, ServeState::Failed(_) | ServeState::Closed(_))
    }
}

/// Build the router with the single `/metrics` route
pub fn router(registry: Registry) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(registry)
}

/// Turn a bare `:port` address into one the socket layer accepts
pub fn normalize_addr(addr: &str) -> String {
    if addr.starts_with(':') {
        format!("0.0.0.0{}", addr)
    } else {
        addr.to_string()
    }
}

/// Bind `addr` and serve `app` until `shutdown` fires
///
/// Every transition is published on `state`. Failures have no caller to
/// return to, so they are logged and published instead.
pub(crate) async fn serve(
    addr: &str,
    app: Router,
    shutdown: &CancellationToken,
    state: &watch::Sender<ServeState>,
    binds: &AtomicU64,
) -> Option<SocketAddr> {
    let bind_addr = normalize_addr(addr);
    let listener = match TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(addr = %bind_addr, error = %e, "Failed to bind metrics server");
            state.send_replace(ServeState::Failed(e.to_string()));
            return None;
        }
    };

    let local_addr = match listener.local_addr() {
        Ok(local_addr) => local_addr,
        Err(e) => {
            error!(addr = %bind_addr, error = %e, "Failed to read metrics server address");
            state.send_replace(ServeState::Failed(e.to_string()));
            return None;
        }
    };

    binds.fetch_add(1, Ordering::AcqRel);
    info!("Metrics server listening on http://{}/metrics", local_addr);
    state.send_replace(ServeState::Listening(local_addr));

    let signal = shutdown.clone();
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async move { signal.cancelled().await })
        .await;

    match result {
        Ok(()) => {
            info!("Metrics server closed");
            state.send_replace(ServeState::Closed(None));
        }
        Err(e) if shutdown.is_cancelled() => {
            error!(error = %e, "Metrics server failed while shutting down");
            state.send_replace(ServeState::Closed(Some(e.to_string())));
        }
        Err(e) => {
            error!(error = %e, "Metrics server stopped unexpectedly");
            state.send_replace(ServeState::Failed(e.to_string()));
        }
    }

    Some(local_addr)
}

/// Handler for `/metrics` endpoint
///
/// Returns all metrics in Prometheus text exposition format
async fn metrics_handler(State(registry): State<Registry>) -> Response {
    debug!("Serving metrics");

    let metric_families = registry.gather();
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", encoder.format_type())],
            buffer,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
                .into_response()
        }
    }
}
