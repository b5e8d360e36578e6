use axum::{
    Router,
    extract::{FromRef, Request},
    http::{HeaderName, HeaderValue, Method, header},
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Authentication and authorization core.
pub mod auth;
pub mod password;
pub mod session;
pub mod token;

// Application services and plumbing.
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod repository;
pub mod storage;

// Public vs. authenticated route tables.
pub mod routes;
use auth::AuthUser;
use routes::{authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use repository::{InMemoryRepository, PostgresRepository, RepositoryState};
pub use session::SessionTransport;
pub use storage::{MockStorageService, S3StorageClient, StorageState};
pub use token::TokenCodec;

/// ApiDoc
///
/// OpenAPI document for every route, served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::signup, handlers::login, handlers::profile, handlers::logout,
        handlers::create_post, handlers::update_post, handlers::list_posts, handlers::get_post
    ),
    components(
        schemas(
            models::Credentials, models::PublicUser, models::Post, models::PostView,
            models::PostForm, models::SignupResponse, models::LoginResponse,
            models::MessageResponse, token::Claims,
        )
    ),
    tags(
        (name = "inkpost", description = "Blog publishing API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single shared container of services and configuration. The token codec
/// and session transport are derived from `config` once, at construction.
#[derive(Clone)]
pub struct AppState {
    pub repo: RepositoryState,
    pub storage: StorageState,
    pub config: AppConfig,
    pub tokens: TokenCodec,
    pub session: SessionTransport,
}

impl AppState {
    pub fn new(repo: RepositoryState, storage: StorageState, config: AppConfig) -> Self {
        Self {
            tokens: TokenCodec::from_config(&config),
            session: SessionTransport::from_config(&config),
            repo,
            storage,
            config,
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for StorageState {
    fn from_ref(app_state: &AppState) -> StorageState {
        app_state.storage.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

impl FromRef<AppState> for TokenCodec {
    fn from_ref(app_state: &AppState) -> TokenCodec {
        app_state.tokens.clone()
    }
}

/// auth_middleware
///
/// Guards `authenticated_routes`: extracting `AuthUser` verifies the session,
/// and a failed extraction answers 401 before the handler runs.
async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// cors_layer
///
/// Credentialed CORS for the browser client. The origin, methods and headers are
/// explicit since browsers refuse wildcards on credentialed requests. Requests
/// from any other origin get no `Access-Control-Allow-Origin` header at all.
pub fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origin = HeaderValue::from_str(&config.cors_origin).unwrap_or_else(|_| {
        tracing::warn!(origin = %config.cors_origin, "invalid CORS_ORIGIN, falling back to localhost");
        HeaderValue::from_static("http://localhost:5173")
    });

    CorsLayer::new()
        .allow_origin([origin])
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

/// create_router
///
/// Assembles routes, middleware and state.
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);
    let max_upload_bytes = state.config.max_upload_bytes;
    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes(max_upload_bytes)
                .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware)),
        )
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span for one request, tagged with its `x-request-id` so every log line of
/// the request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
