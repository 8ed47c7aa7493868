//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store/backend selection and the shared `AuthService`
//! - `routes/`: HTTP routes + handlers
//! - `dto.rs`: request/response bodies
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(services: Arc<AppServices>) -> Router {
    // Protected routes: require a valid access token.
    let protected = routes::auth::protected_router().layer(axum::middleware::from_fn_with_state(
        services.clone(),
        middleware::auth_middleware,
    ));

    let auth = routes::auth::router().merge(protected);

    Router::new()
        .route("/health", get(routes::system::health))
        .nest("/auth", auth)
        .layer(ServiceBuilder::new().layer(Extension(services)))
}

pub use services::{AppServices, ServicesError};
