//! HTTP ingress for telemetry events.
//!
//! `POST /api/event` decodes one event and publishes it to the durable queue.
//! Nothing is processed here; the dispatcher picks the event up later.

use crate::core::{Event, EventPublisher};
use crate::internal_metrics::Metrics;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

pub const EVENT_PATH: &str = "/api/event";
pub const ACCEPTED_BODY: &str = "Event received and queued.";

/// Shared state handed to every request.
#[derive(Clone)]
pub struct IngressState {
    publisher: Arc<dyn EventPublisher>,
    metrics: Metrics,
}

/// Builds the ingress router.
pub fn router(publisher: Arc<dyn EventPublisher>, metrics: Metrics) -> Router {
    Router::new()
        .route(
            EVENT_PATH,
            post(receive_event).fallback(method_not_allowed),
        )
        .route("/health", get(health))
        .with_state(IngressState { publisher, metrics })
}

async fn receive_event(State(state): State<IngressState>, body: Bytes) -> impl IntoResponse {
    state.metrics.events_received_total.increment(1);

    let event = match Event::from_json(&body) {
        Ok(event) => event,
        Err(e) => {
            state.metrics.increment_rejected("malformed");
            debug!(error = %e, "Rejecting malformed event payload");
            return (StatusCode::BAD_REQUEST, "Invalid JSON event payload.");
        }
    };

    let payload = match event.to_json() {
        Ok(payload) => payload,
        Err(e) => {
            error!(error = %e, "Failed to serialize event");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to enqueue event.");
        }
    };

    if let Err(e) = state.publisher.publish(payload).await {
        state.metrics.enqueue_failures_total.increment(1);
        error!(vehicle = %event.vehicle_identifier, error = %e, "Failed to publish event to queue");
        return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to enqueue event.");
    }

    state.metrics.events_enqueued_total.increment(1);
    (StatusCode::OK, ACCEPTED_BODY)
}

async fn method_not_allowed(State(state): State<IngressState>) -> impl IntoResponse {
    state.metrics.increment_rejected("method");
    (
        StatusCode::METHOD_NOT_ALLOWED,
        "Only POST requests are accepted.",
    )
}

async fn health() -> &'static str {
    "ok"
}

/// The HTTP server for the ingress router.
pub struct IngressServer {
    listener: TcpListener,
    router: Router,
    shutdown_rx: watch::Receiver<bool>,
}

impl IngressServer {
    pub fn new(listener: TcpListener, router: Router, shutdown_rx: watch::Receiver<bool>) -> Self {
        Self {
            listener,
            router,
            shutdown_rx,
        }
    }

    /// Serves requests until shutdown, letting in-progress requests finish.
    pub fn run(self) -> impl Future<Output = ()> {
        let mut shutdown_rx = self.shutdown_rx;
        async move {
            if let Ok(addr) = self.listener.local_addr() {
                info!(%addr, "Ingress server listening");
            }
            let shutdown = async move {
                let _ = shutdown_rx.wait_for(|stop| *stop).await;
            };
            if let Err(e) = axum::serve(self.listener, self.router)
                .with_graceful_shutdown(shutdown)
                .await
            {
                warn!("Ingress server error: {}", e);
            }
            info!("Ingress server stopped.");
        }
    }
}
