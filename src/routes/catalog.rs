use crate::{AppState, handlers::catalog};
use axum::{
    Router,
    routing::{delete, get},
};

/// Catalog Router Module
///
/// Categories and genres only support list, create and delete (by slug).
/// Titles support the full set of operations.
pub fn catalog_routes() -> Router<AppState> {
    Router::new()
        // GET/POST /categories?search=...
        .route(
            "/categories",
            get(catalog::list_categories).post(catalog::create_category),
        )
        .route("/categories/{slug}", delete(catalog::delete_category))
        // GET/POST /genres?search=...
        .route(
            "/genres",
            get(catalog::list_genres).post(catalog::create_genre),
        )
        .route("/genres/{slug}", delete(catalog::delete_genre))
        // GET /titles?category=&genre=&name=&year=
        .route(
            "/titles",
            get(catalog::list_titles).post(catalog::create_title),
        )
        .route(
            "/titles/{title_id}",
            get(catalog::get_title)
                .patch(catalog::update_title)
                .delete(catalog::delete_title),
        )
}
