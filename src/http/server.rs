//! HTTP server setup.
//!
//! Gateway endpoints are routed directly; everything else falls through to
//! the dispatcher and reaches whichever service is mounted under the path.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::store::ConfigStore;
use crate::http::dispatch::{self, Dispatcher};
use crate::http::{auth, handlers};
use crate::lifecycle::ShutdownSignal;
use crate::routing::registry::RouterRegistry;
use crate::status::StatusAggregator;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<RouterRegistry>,
    pub config: Arc<ConfigStore>,
    pub status: StatusAggregator,
    pub dispatcher: Arc<Dispatcher>,
}

impl AppState {
    pub fn new(registry: Arc<RouterRegistry>, config: Arc<ConfigStore>) -> Self {
        Self {
            status: StatusAggregator::new(Arc::clone(&registry), Arc::clone(&config)),
            dispatcher: Arc::new(Dispatcher::new(Arc::clone(&registry))),
            registry,
            config,
        }
    }
}

/// HTTP server for the gateway.
pub struct GatewayServer {
    router: Router,
}

impl GatewayServer {
    pub fn new(registry: Arc<RouterRegistry>, config: Arc<ConfigStore>) -> Self {
        let timeout = Duration::from_secs(config.get_gateway_config().request_timeout_secs);
        let state = AppState::new(registry, config);
        Self {
            router: Self::build_router(state, timeout),
        }
    }

    /// Build the axum router with all middleware layers.
    pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
        let management = Router::new()
            .route("/gateway/reload/{service}", post(handlers::reload_service))
            .route("/gateway/config/reload", post(handlers::reload_config))
            .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_admin));

        Router::new()
            .route("/", get(handlers::root))
            .route("/health", get(handlers::health))
            .route("/gateway/status", get(handlers::gateway_status))
            .route("/gateway/services", get(handlers::list_services))
            .merge(management)
            .fallback(dispatch::dispatch)
            .with_state(state)
            .layer(TimeoutLayer::with_status_code(StatusCode::GATEWAY_TIMEOUT, request_timeout))
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
                let request_id = req
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("n/a");
                tracing::info_span!(
                    "http_request",
                    method = %req.method(),
                    uri = %req.uri().path(),
                    request_id = %request_id,
                )
            }))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve on `listener` until `shutdown` fires or its coordinator is dropped.
    pub async fn run(self, listener: TcpListener, mut shutdown: ShutdownSignal) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                shutdown.triggered().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
