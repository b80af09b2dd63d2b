//! Admin API.
//!
//! Read-only JSON views of the running gateway, served on
//! `admin.bind_address` behind a bearer token:
//! - `GET /admin/status`
//! - `GET /admin/filters`
//! - `GET /admin/origins`

pub mod auth;
pub mod handlers;

use axum::{middleware, routing::get, Router};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::http::server::AppState;

pub fn setup_admin_router(state: AppState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/filters", get(get_filters))
        .route("/admin/origins", get(get_origins))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}
