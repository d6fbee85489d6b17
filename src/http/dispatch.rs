//! Dispatch to mounted services.
//!
//! The combined router over all mounts is cached and rebuilt only when the
//! registry generation moves, so a remount is picked up by the next request.

use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::extract::{OriginalUri, Request, State};
use axum::response::{IntoResponse, Response};
use axum::Router;
use tower::ServiceExt;

use crate::http::response::ApiError;
use crate::http::server::AppState;
use crate::routing::registry::{MountPoint, RouterRegistry};

/// Combined router for one registry generation.
#[derive(Clone)]
pub struct MountedRoutes {
    generation: u64,
    router: Router,
}

impl MountedRoutes {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Routes requests to whatever is mounted right now.
pub struct Dispatcher {
    registry: Arc<RouterRegistry>,
    cache: ArcSwap<MountedRoutes>,
}

impl Dispatcher {
    pub fn new(registry: Arc<RouterRegistry>) -> Self {
        let initial = MountedRoutes {
            generation: registry.generation(),
            router: build_mount_router(&registry.mounts()),
        };
        Self {
            registry,
            cache: ArcSwap::from_pointee(initial),
        }
    }

    /// Router for the current generation, rebuilt if stale.
    pub fn current(&self) -> Arc<MountedRoutes> {
        let cached = self.cache.load_full();
        let generation = self.registry.generation();
        if cached.generation == generation {
            return cached;
        }

        let rebuilt = Arc::new(MountedRoutes {
            generation,
            router: build_mount_router(&self.registry.mounts()),
        });
        tracing::debug!(generation, "Rebuilt mounted routes");
        self.cache.store(Arc::clone(&rebuilt));
        rebuilt
    }
}

/// Nest every mount under its prefix. Paths matching nothing get a JSON 404.
pub fn build_mount_router(mounts: &[Arc<MountPoint>]) -> Router {
    mounts
        .iter()
        .fold(Router::new(), |router, mount| {
            router.nest_service(mount.url_prefix(), mount.router().clone().fallback(not_found))
        })
        .fallback(not_found)
}

/// Fallback of the gateway router.
pub async fn dispatch(State(state): State<AppState>, request: Request) -> Response {
    let routes = state.dispatcher.current();
    match routes.router.clone().oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    }
}

pub async fn not_found(OriginalUri(uri): OriginalUri) -> impl IntoResponse {
    tracing::debug!(path = %uri.path(), "No route matched");
    ApiError::not_found(uri.path())
}
