//! API routes

pub mod domains;
pub mod health;
pub mod storefront;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::{routing::tenant_resolution_middleware, state::AppState};

/// Public storefront router: every host is resolved to a tenant or redirected
pub fn create_router(state: AppState) -> Router {
    let storefront_routes = Router::new()
        .route("/__tenant", get(storefront::tenant_context))
        .fallback(storefront::tenant_context)
        .layer(middleware::from_fn_with_state(
            state.resolver.clone(),
            tenant_resolution_middleware,
        ));

    Router::new()
        .merge(storefront_routes)
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(64 * 1024))
        .with_state(state)
}

/// Internal router for health checks and domain management.
///
/// Served on its own listener, never on the public one.
pub fn create_internal_router(state: AppState) -> Router {
    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    let internal_routes = Router::new()
        .route("/tenants/:tenant_id/domains", post(domains::attach_domain))
        .route(
            "/tenants/:tenant_id/domains/:domain",
            get(domains::get_domain_status).delete(domains::detach_domain),
        )
        .route(
            "/tenants/:tenant_id/domains/:domain/verify",
            post(domains::verify_domain),
        );

    Router::new()
        .merge(health_routes)
        .nest("/internal/v1", internal_routes)
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(64 * 1024))
        .with_state(state)
}
