use axum::{Router, extract::FromRef, http::HeaderName, routing::get};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Core: roles, access rules, confirmation codes, review invariant.
pub mod accounts;
pub mod auth;
pub mod confirmation;
pub mod permissions;
pub mod reviews;
pub mod roles;

// Supporting services and data.
pub mod config;
pub mod error;
pub mod extract;
pub mod mailer;
pub mod models;
pub mod repository;
pub mod validators;

// HTTP surface.
pub mod handlers;
pub mod routes;

// --- Public Re-exports ---

pub use config::AppConfig;
pub use error::ApiError;
pub use mailer::{HttpMailer, LogMailer, MailerState, MockMailer};
pub use repository::{InMemoryRepository, PostgresRepository, RepositoryState};

/// ApiDoc
///
/// The OpenAPI document for every route under `/api/v1`, served at
/// `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::auth::signup, handlers::auth::obtain_token,
        handlers::catalog::list_categories, handlers::catalog::create_category,
        handlers::catalog::delete_category, handlers::catalog::list_genres,
        handlers::catalog::create_genre, handlers::catalog::delete_genre,
        handlers::catalog::list_titles, handlers::catalog::get_title,
        handlers::catalog::create_title, handlers::catalog::update_title,
        handlers::catalog::delete_title,
        handlers::reviews::list_reviews, handlers::reviews::create_review,
        handlers::reviews::get_review, handlers::reviews::update_review,
        handlers::reviews::delete_review, handlers::reviews::list_comments,
        handlers::reviews::create_comment, handlers::reviews::get_comment,
        handlers::reviews::update_comment, handlers::reviews::delete_comment,
        handlers::users::list_users, handlers::users::create_user,
        handlers::users::get_user, handlers::users::update_user,
        handlers::users::delete_user, handlers::users::get_me,
        handlers::users::update_me,
    ),
    components(
        schemas(
            roles::Role, models::Category, models::Genre, models::Title, models::Review,
            models::Comment, models::SignupRequest, models::TokenRequest,
            models::TokenResponse, models::CategoryRequest, models::CreateTitleRequest,
            models::UpdateTitleRequest, models::CreateReviewRequest,
            models::UpdateReviewRequest, models::CreateCommentRequest,
            models::UpdateCommentRequest, models::CreateUserRequest,
            models::UpdateUserRequest, models::UpdateMeRequest, models::UserProfile,
        )
    ),
    tags(
        (name = "yamdb", description = "Media review catalog API")
    )
)]
pub struct ApiDoc;

/// AppState
///
/// Shared, immutable container of the application's services. Cloned per
/// request; the services themselves sit behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Persistence: Postgres in production, in-memory in tests.
    pub repo: RepositoryState,
    /// Outgoing mail for confirmation codes.
    pub mailer: MailerState,
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for MailerState {
    fn from_ref(app_state: &AppState) -> MailerState {
        app_state.mailer.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// api_routes
///
/// Everything mounted under `/api/v1`.
fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(routes::auth::auth_routes())
        .merge(routes::catalog::catalog_routes())
        .merge(routes::reviews::review_routes())
        .merge(routes::users::user_routes())
}

/// create_router
///
/// Assembles the routing structure, the observability layers and the state.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // GET /health
        // Liveness probe. Touches neither the store nor the mailer.
        .route("/health", get(|| async { "ok" }))
        .nest("/api/v1", api_routes())
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                // Generates a UUID x-request-id for every incoming request.
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
                // Echoes x-request-id back to the client.
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Opens the `http_request` span with method, URI and request id so every log
/// line of one request can be correlated.
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
