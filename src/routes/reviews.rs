use crate::{AppState, handlers::reviews};
use axum::{Router, routing::get};

/// Review Router Module
///
/// Reviews live under their title and comments under their review. Handlers
/// resolve the chain parent-first, so a review id under the wrong title is a 404.
pub fn review_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/titles/{title_id}/reviews",
            get(reviews::list_reviews).post(reviews::create_review),
        )
        .route(
            "/titles/{title_id}/reviews/{review_id}",
            get(reviews::get_review)
                .patch(reviews::update_review)
                .delete(reviews::delete_review),
        )
        .route(
            "/titles/{title_id}/reviews/{review_id}/comments",
            get(reviews::list_comments).post(reviews::create_comment),
        )
        .route(
            "/titles/{title_id}/reviews/{review_id}/comments/{comment_id}",
            get(reviews::get_comment)
                .patch(reviews::update_comment)
                .delete(reviews::delete_comment),
        )
}
