use crate::{AppState, handlers};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post, put},
};

/// Authenticated Router Module
///
/// Every route here sits behind the auth middleware. Creating a post only needs
/// a session; updating one additionally passes the ownership check in the handler.
///
/// The post routes accept multipart bodies up to `max_upload_bytes` instead of
/// axum's 2 MB default, so full-size photos can be used as covers.
pub fn authenticated_routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::<AppState>::new()
        // GET /profile
        .route("/profile", get(handlers::profile))
        // POST /post
        .route(
            "/post",
            post(handlers::create_post).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        // PUT /post/{id}
        // Author-only.
        .route(
            "/post/{id}",
            put(handlers::update_post).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
}
