//! HTTP server exposing alerts and on-demand agent runs.
//!
//! Routes:
//! - `GET /health`: liveness and version
//! - `GET /alerts`: every stored alert, in storage order
//! - `POST /run`: run the agent over `{"filepath": "..."}`
//!
//! The pipeline is synchronous, so each request runs it on the blocking
//! thread pool with its own datastore session.

use crate::handler::{
    missing_filepath_body, parse_run_event, run_result_body, INTERNAL_ERROR_MESSAGE,
};
use crate::ledger::SharedRunLedger;
use crate::pipeline::{Agent, IdentityStrategy};
use crate::store::{AlertOrder, AlertReader, AlertView, Datastore};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderValue, Method, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Server configuration
#[derive(Clone)]
pub struct ServerConfig {
    /// Port to bind to (0 for random)
    pub port: u16,
    /// Alert store shared by all requests
    pub store: Arc<dyn Datastore>,
    /// Identity strategy for runs started over HTTP
    pub identity: IdentityStrategy,
    /// Ledger that records runs started over HTTP
    pub ledger: Option<SharedRunLedger>,
}

impl ServerConfig {
    /// Create a new server configuration
    pub fn new(port: u16, store: Arc<dyn Datastore>) -> Self {
        Self {
            port,
            store,
            identity: IdentityStrategy::Positional,
            ledger: None,
        }
    }

    pub fn with_identity(mut self, identity: IdentityStrategy) -> Self {
        self.identity = identity;
        self
    }

    pub fn with_ledger(mut self, ledger: SharedRunLedger) -> Self {
        self.ledger = Some(ledger);
        self
    }
}

/// Shared server state
struct ServerState {
    store: Arc<dyn Datastore>,
    identity: IdentityStrategy,
    ledger: Option<SharedRunLedger>,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn internal_error() -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: INTERNAL_ERROR_MESSAGE.to_string(),
        }),
    )
}

fn status_from(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /alerts
async fn alerts(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<Vec<AlertView>>, (StatusCode, Json<ErrorResponse>)> {
    let store = Arc::clone(&state.store);

    let result = tokio::task::spawn_blocking(move || {
        AlertReader::new(store.as_ref()).fetch(AlertOrder::Storage)
    })
    .await;

    match result {
        Ok(Ok(alerts)) => Ok(Json(alerts)),
        Ok(Err(e)) => {
            tracing::error!("Failed to fetch alerts: {}", e);
            Err(internal_error())
        }
        Err(e) => {
            tracing::error!("Alert fetch task failed: {}", e);
            Err(internal_error())
        }
    }
}

/// POST /run
///
/// Accepts `{"filepath": "..."}` and answers with the same status codes as
/// the run-agent function. A missing or non-JSON body is a 400.
async fn run_agent(
    State(state): State<Arc<ServerState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> (StatusCode, Json<Value>) {
    let event = match body {
        Ok(Json(event)) => parse_run_event(&event),
        Err(rejection) => {
            tracing::warn!("Run request rejected: {}", rejection.body_text());
            None
        }
    };
    let Some(event) = event else {
        let (status, body) = missing_filepath_body();
        return (status_from(status), Json(body));
    };

    let worker_state = Arc::clone(&state);
    let result = tokio::task::spawn_blocking(move || {
        let result = Agent::new(worker_state.store.as_ref())
            .with_identity(worker_state.identity)
            .run(&event.filepath);
        if let Some(ref ledger) = worker_state.ledger {
            ledger.record_run(&result);
            if let Err(e) = ledger.save() {
                tracing::warn!("Could not save run ledger: {}", e);
            }
        }
        run_result_body(&result)
    })
    .await;

    match result {
        Ok((status, body)) => (status_from(status), Json(body)),
        Err(e) => {
            tracing::error!("Agent run task failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": INTERNAL_ERROR_MESSAGE })),
            )
        }
    }
}

/// Build the router for the given state.
fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/alerts", get(alerts))
        .route("/run", post(run_agent))
        .layer(
            CorsLayer::new()
                .allow_origin([
                    HeaderValue::from_static("http://localhost"),
                    HeaderValue::from_static("http://127.0.0.1"),
                ])
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP server
pub async fn run(
    config: ServerConfig,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let state = Arc::new(ServerState {
        store: config.store,
        identity: config.identity,
        ledger: config.ledger,
    });

    let app = router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("Stress alert server listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Server shutdown signal received");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}
