//! Community resource directory.
//!
//! The store service (REST + change stream over SQLite) lives in [`api`],
//! [`db`] and [`realtime`]; the client core that keeps a live read model
//! and drives vote-gated moderation lives in [`client`].

pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod db;
pub mod errors;
pub mod models;
pub mod realtime;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use db::Repository;
use realtime::ChangeFeed;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub changes: ChangeFeed,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(repo: Repository, config: Config) -> Self {
        Self {
            repo: Arc::new(repo),
            changes: ChangeFeed::new(config.change_buffer),
            config: Arc::new(config),
        }
    }
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let psk = state.config.admin_psk.clone();

    let admin_routes = Router::new()
        .route("/resources", post(api::admin_create_resource))
        .route(
            "/resources/{id}",
            put(api::admin_edit_resource).delete(api::delete_resource),
        )
        .route("/resources/{id}/approve", post(api::approve_resource))
        .route("/resources/{id}/reject", post(api::reject_resource))
        .route("/edits/{id}/reject", post(api::reject_edit))
        .layer(middleware::from_fn(move |req, next| {
            auth::admin_auth_layer(psk.clone(), req, next)
        }));

    let api_routes = Router::new()
        // Snapshot
        .route("/snapshot", get(api::get_snapshot))
        .route("/snapshot/revision", get(api::get_revision))
        // Resources
        .route(
            "/resources",
            get(api::list_resources).post(api::create_resource),
        )
        .route("/resources/{id}", get(api::get_resource))
        .route("/resources/{id}/counts", get(api::get_vote_counts))
        .route("/resources/{id}/edits", post(api::propose_edit))
        // Edits
        .route("/edits", get(api::list_edits))
        .route("/edits/{id}", get(api::get_edit))
        .route("/edits/{id}/approve", post(api::approve_edit))
        // Votes
        .route("/votes/{kind}", get(api::find_votes).post(api::cast_vote))
        // Visitors
        .route("/visitors", post(api::record_visit))
        .route("/visitors/count", get(api::visitor_count))
        // Change stream and identity
        .route("/changes", get(api::stream_changes))
        .route("/ip", get(api::lookup_ip))
        .nest("/admin", admin_routes);

    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests;
