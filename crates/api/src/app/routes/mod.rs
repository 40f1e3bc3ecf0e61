use axum::{Router, routing::get};

pub mod auth;
pub mod organizations;
pub mod roles;
pub mod system;
pub mod users;

/// Router for all authenticated (principal-scoped) endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/organizations", organizations::router())
        .nest("/roles", roles::router())
        .nest("/users", users::router())
}
