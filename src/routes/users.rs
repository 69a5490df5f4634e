use crate::{AppState, handlers::users};
use axum::{Router, routing::get};

/// User Router Module
///
/// `/users/me` is a static segment and takes precedence over `/users/{username}`,
/// which is why `me` is a reserved username.
pub fn user_routes() -> Router<AppState> {
    Router::new()
        // GET/POST /users?search=...  (admins only)
        .route("/users", get(users::list_users).post(users::create_user))
        // GET/PATCH /users/me  (any authenticated user; role cannot be changed)
        .route("/users/me", get(users::get_me).patch(users::update_me))
        // GET/PATCH/DELETE /users/{username}  (admins only)
        .route(
            "/users/{username}",
            get(users::get_user)
                .patch(users::update_user)
                .delete(users::delete_user),
        )
}
