//! Route modules.

use axum::Router;

use crate::state::AppState;

pub mod health;
pub mod restaurants;
pub mod users;
pub mod workflows;

/// Every route, nested under its prefix, without middleware.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .nest("/api/v1/workflows", workflows::router())
        .nest("/api/v1/users", users::router())
        .nest("/api/v1/restaurants", restaurants::router())
}
