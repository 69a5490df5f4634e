use crate::{AppState, handlers::auth};
use axum::{Router, routing::post};

/// Auth Router Module
///
/// The two halves of the confirmation-code flow. Neither requires credentials.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        // POST /auth/signup
        // Gets or creates the account and mails a confirmation code.
        .route("/auth/signup", post(auth::signup))
        // POST /auth/token
        // Trades a confirmation code for a session token.
        .route("/auth/token", post(auth::obtain_token))
}
