//! HTTP API server with SSE support

use super::broker::EventBroker;
use crate::config::ZeppelinConfig;
use crate::error::Result;
use crate::state::TopologyStore;
use crate::types::{Activity, Diff, Snapshot};
use axum::{
    extract::State,
    http::StatusCode,
    response::{
        sse::{Event as SseEvent, KeepAlive},
        Sse,
    },
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{convert::Infallible, future::Future, net::SocketAddr, path::PathBuf, sync::Arc};
use tokio_stream::{Stream, StreamExt as _};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::{debug, info, warn};

/// API server state
#[derive(Clone)]
pub struct AppState {
    /// Topology engine
    pub store: Arc<TopologyStore>,
    /// Observer registry
    pub broker: EventBroker,
}

impl AppState {
    pub fn new(store: Arc<TopologyStore>, broker: EventBroker) -> Self {
        Self { store, broker }
    }
}

/// Build the API router
///
/// Frontend assets are served from `static_dir` for any path the API does
/// not claim.
pub fn build_router(state: AppState, static_dir: Option<PathBuf>) -> Router {
    let router = Router::new()
        .route("/api/events", get(events_handler))
        .route("/api/snapshot", get(snapshot_handler))
        .route("/api/activity", post(activity_handler))
        .route("/health", get(health_handler))
        .with_state(state);

    let router = match static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    };

    router.layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    )
}

/// API server
pub struct ApiServer {
    addr: SocketAddr,
    static_dir: Option<PathBuf>,
    state: AppState,
}

impl ApiServer {
    /// Create a server over shared engine and broker handles
    pub fn new(config: &ZeppelinConfig, store: Arc<TopologyStore>, broker: EventBroker) -> Result<Self> {
        Ok(Self {
            addr: config.socket_addr()?,
            static_dir: config.static_dir.clone(),
            state: AppState::new(store, broker),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone(), self.static_dir.clone())
    }

    /// Serve until `shutdown` resolves
    pub async fn serve<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        info!("Zeppelin listening on http://{}", listener.local_addr()?);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("API server stopped");
        Ok(())
    }
}

/// SSE events handler
///
/// 1. Registers the observer with the broker
/// 2. Sends a `connected` handshake
/// 3. Sends the current snapshot, read after registration so no diff
///    published in between is lost (at worst it is seen twice)
/// 4. Relays queued diffs
///
/// The subscription lives inside the response stream; when the client goes
/// away the stream is dropped and the observer deregistered.
async fn events_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = std::result::Result<SseEvent, Infallible>>> {
    let subscription = state.broker.subscribe();
    debug!(subscriber = %subscription.id(), "Sending initial snapshot");

    let snapshot = state.store.snapshot().await;

    let mut initial: Vec<std::result::Result<SseEvent, Infallible>> =
        vec![Ok(SseEvent::default().event("connected").data("{}"))];
    match serde_json::to_string(&snapshot) {
        Ok(data) => initial.push(Ok(SseEvent::default().data(data))),
        Err(e) => warn!(error = %e, "Failed to serialize snapshot"),
    }

    let live = subscription.map(|payload| Ok::<_, Infallible>(SseEvent::default().data(&*payload)));

    Sse::new(tokio_stream::iter(initial).chain(live)).keep_alive(KeepAlive::default())
}

/// One-shot snapshot fetch
async fn snapshot_handler(State(state): State<AppState>) -> Json<Snapshot> {
    Json(state.store.snapshot().await)
}

/// Activity reported by an external event source
#[derive(Debug, Deserialize)]
pub struct ActivityRequest {
    pub event: String,
    pub agent: String,
    #[serde(default)]
    pub detail: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Append to the activity log and push it to observers as a diff
async fn activity_handler(
    State(state): State<AppState>,
    Json(req): Json<ActivityRequest>,
) -> StatusCode {
    let activity = Activity {
        timestamp: req.timestamp.unwrap_or_else(Utc::now),
        event: req.event,
        agent: req.agent,
        detail: req.detail,
    };
    debug!(event = %activity.event, agent = %activity.agent, "Activity received");

    state.store.append_activity(activity.clone()).await;
    if state.broker.subscriber_count() > 0 {
        state.broker.broadcast(&Diff::activity(activity));
    }

    StatusCode::ACCEPTED
}

/// Health check handler
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub subscribers: usize,
    pub nodes: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        subscribers: state.broker.subscriber_count(),
        nodes: state.store.node_count().await,
    })
}
