//! API module
//!
//! HTTP API endpoints and middleware.

pub mod middleware;
pub mod routes;

use axum::Router;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

pub use routes::{create_router, AppState};

/// Build the application router with its middleware stack.
///
/// Outermost first: request id is assigned, echoed on the response, then the
/// request is traced and logged.
pub fn build_router(state: AppState) -> Router {
    create_router()
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(
                    middleware::REQUEST_ID_HEADER.clone(),
                    MakeRequestUuid,
                ))
                .layer(PropagateRequestIdLayer::new(
                    middleware::REQUEST_ID_HEADER.clone(),
                ))
                .layer(TraceLayer::new_for_http())
                .layer(axum::middleware::from_fn(middleware::logging_middleware)),
        )
        .with_state(state)
}
