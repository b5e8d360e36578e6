use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without a session. Read endpoints still look at an
/// optional session to compute `editable`, but never reject a bad one.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for load balancers.
        .route("/health", get(|| async { "ok" }))
        // POST /signup
        .route("/signup", post(handlers::signup))
        // POST /login
        // Sets the `token` session cookie on success.
        .route("/login", post(handlers::login))
        // POST /logout
        // Clears the cookie. Public so a stale or expired session can still log out.
        .route("/logout", post(handlers::logout))
        // GET /allposts
        .route("/allposts", get(handlers::list_posts))
        // GET /post/{id}
        .route("/post/{id}", get(handlers::get_post))
}
