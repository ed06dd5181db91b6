//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the fetch handler
//! - Wire up middleware (tracing, request ID)
//! - Serve guarded connections from a `LimitedListener`
//! - Derive a cancellation token per request
//! - Drain on shutdown, cancelling requests once the grace period is gone

use std::future::IntoFuture;
use std::io;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use tokio::sync::{broadcast, oneshot};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::Instrument;

use crate::config::FanoutConfig;
use crate::fetch::{DispatchError, Dispatcher, FetchResponse, Fetcher};
use crate::http::request::{propagate_request_id_layer, request_id, set_request_id_layer};
use crate::net::{Acceptor, LimitedListener};
use crate::observability::metrics;

/// Application state injected into handlers.
pub struct AppState<F> {
    pub dispatcher: Arc<Dispatcher<F>>,
    /// Parent of every request's cancellation token.
    pub cancel: CancellationToken,
}

impl<F> Clone for AppState<F> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: Arc::clone(&self.dispatcher),
            cancel: self.cancel.clone(),
        }
    }
}

/// HTTP server for the fan-out service.
pub struct HttpServer {
    router: Router,
    config: FanoutConfig,
    cancel: CancellationToken,
}

impl HttpServer {
    /// Create a new HTTP server fetching through `fetcher`.
    pub fn new<F: Fetcher>(config: FanoutConfig, fetcher: F) -> Self {
        let cancel = CancellationToken::new();
        let state = AppState {
            dispatcher: Arc::new(Dispatcher::new(fetcher, &config.fetch)),
            cancel: cancel.clone(),
        };

        let router = Self::build_router(state);
        Self {
            router,
            config,
            cancel,
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router<F: Fetcher>(state: AppState<F>) -> Router {
        Router::new()
            .route("/", post(fetch_handler::<F>))
            .route("/{*path}", post(fetch_handler::<F>))
            .with_state(state)
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(set_request_id_layer())
    }

    /// The router, for driving the service without a listener.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Token whose cancellation fails every in-flight request.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the server until `shutdown` fires and connections have drained.
    ///
    /// On shutdown the admission gate closes, open connections get the
    /// configured grace period to finish, then outstanding requests are
    /// cancelled and given one fetch timeout to answer.
    pub async fn run<A: Acceptor>(
        self,
        listener: LimitedListener<A>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> io::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = ?addr,
            max_connections = listener.max_connections(),
            "HTTP server starting"
        );

        let gate = listener.gate().clone();
        let grace = self.config.shutdown.grace_period();
        let answer_window = self.config.fetch.timeout();
        let (draining_tx, draining_rx) = oneshot::channel();

        let serve = axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, closing admission gate");
                gate.close();
                let _ = draining_tx.send(());
            })
            .into_future();
        tokio::pin!(serve);

        tokio::select! {
            biased;
            result = &mut serve => return result,
            _ = draining_rx => {}
        }

        if let Ok(result) = tokio::time::timeout(grace, &mut serve).await {
            tracing::info!("HTTP server stopped");
            return result;
        }

        tracing::warn!(grace_period = ?grace, "Grace period elapsed, cancelling in-flight requests");
        self.cancel.cancel();
        match tokio::time::timeout(answer_window, &mut serve).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!("Connections still open at exit");
                Ok(())
            }
        }
    }
}

/// Decode the URL list, fan out, and answer with the collected statuses.
async fn fetch_handler<F: Fetcher>(
    State(state): State<AppState<F>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let start_time = Instant::now();
    let request_id = request_id(&headers).to_string();

    let request = match state.dispatcher.parse(&body) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(request_id = %request_id, error = %e, "Rejected request");
            return status_response(StatusCode::BAD_REQUEST, start_time);
        }
    };

    tracing::info!(request_id = %request_id, urls = request.len(), "Processing request");

    // Dropping this handler (client went away) cancels the request; the
    // spawned dispatch still joins its fetches before noticing.
    let cancel = state.cancel.child_token();
    let _disconnect = cancel.clone().drop_guard();
    let dispatcher = Arc::clone(&state.dispatcher);
    let task = tokio::spawn(
        async move { dispatcher.dispatch(request, &cancel).await }.in_current_span(),
    );

    match task.await {
        Ok(Ok(results)) => {
            tracing::info!(request_id = %request_id, fetched = results.len(), "Response");
            metrics::record_request(StatusCode::OK.as_u16(), start_time);
            Json(FetchResponse::from(results)).into_response()
        }
        Ok(Err(DispatchError::Request(e))) => {
            tracing::warn!(request_id = %request_id, error = %e, "Rejected request");
            status_response(StatusCode::BAD_REQUEST, start_time)
        }
        Ok(Err(e @ DispatchError::Cancelled)) => {
            tracing::error!(request_id = %request_id, error = %e, "Request failed");
            status_response(StatusCode::INTERNAL_SERVER_ERROR, start_time)
        }
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Dispatch task failed");
            status_response(StatusCode::INTERNAL_SERVER_ERROR, start_time)
        }
    }
}

/// Plain-text response carrying the status's canonical reason.
fn status_response(status: StatusCode, start_time: Instant) -> Response {
    metrics::record_request(status.as_u16(), start_time);
    (status, status.canonical_reason().unwrap_or_default()).into_response()
}
