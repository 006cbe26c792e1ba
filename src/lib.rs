//! Card key distribution portal.
//!
//! An admin imports single-use card keys (tenant credentials) and hands out
//! secret links; the holder of a link redeems it once to reveal the
//! credentials. This crate provides the HTTP API, the pluggable storage layer
//! and the admin session handling.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Storage**: JSON file, Redis, or PostgreSQL behind one `Storage` trait
//! - **Authentication**: bcrypt passwords, HS256 session token in an HttpOnly cookie
//! - **Format**: JSON requests/responses, plain text for the import format

pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod parser;
pub mod services;
pub mod storage;
pub mod tokens;

use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, patch, post},
};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::services::auth_service::AuthService;
use crate::storage::Storage;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub auth: AuthService,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(storage: Arc<dyn Storage>, config: Config) -> Self {
        let auth = AuthService::new(storage.clone(), config.signing_key());
        Self {
            storage,
            auth,
            config: Arc::new(config),
        }
    }
}

/// Build the HTTP router.
pub fn router(state: AppState) -> Router {
    // Admin routes, behind the session cookie
    let admin_routes = Router::new()
        .route("/api/admin/logout", post(handlers::auth::logout))
        .route(
            "/api/admin/change-password",
            post(handlers::auth::change_password),
        )
        .route("/api/admin/status", get(handlers::auth::status))
        .route(
            "/api/admin/cardkeys",
            get(handlers::card_keys::list_card_keys).post(handlers::card_keys::create_card_keys),
        )
        .route(
            "/api/admin/cardkeys/{id}",
            patch(handlers::card_keys::update_card_key).delete(handlers::card_keys::delete_card_key),
        )
        .route(
            "/api/admin/cardkeys/export/links",
            get(handlers::card_keys::export_unused_links),
        )
        .route(
            "/api/admin/cardkeys/export/details",
            get(handlers::card_keys::export_unused_details),
        )
        .route("/api/admin/backup", get(handlers::card_keys::backup))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_admin,
        ));

    Router::new()
        // Public routes (no session required)
        .route("/health", get(handlers::health::health_check))
        .route("/api/admin/login", post(handlers::auth::login))
        .route("/api/admin/init", post(handlers::auth::init_admin))
        .route("/api/key/{token}", get(handlers::redemption::get_card_key))
        .merge(admin_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
