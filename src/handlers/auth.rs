use axum::{Json, extract::State};

use crate::{
    AppState, accounts,
    error::ApiError,
    extract::ValidJson,
    models::{SignupRequest, TokenRequest, TokenResponse},
};

/// signup
///
/// [Public Route] Gets or creates the account for `{username, email}` and mails
/// it a confirmation code. Repeating the call with the same pair sends a fresh code.
#[utoipa::path(
    post,
    path = "/api/v1/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 200, description = "Confirmation code sent", body = SignupRequest),
        (status = 400, description = "Invalid or conflicting username/email"),
        (status = 502, description = "Mail delivery failed")
    )
)]
pub async fn signup(
    State(state): State<AppState>,
    ValidJson(payload): ValidJson<SignupRequest>,
) -> Result<Json<SignupRequest>, ApiError> {
    let echoed = accounts::request_signup(
        state.repo.as_ref(),
        state.mailer.as_ref(),
        &state.config,
        payload,
    )
    .await?;
    Ok(Json(echoed))
}

/// obtain_token
///
/// [Public Route] Exchanges a confirmation code for a session token.
#[utoipa::path(
    post,
    path = "/api/v1/auth/token",
    request_body = TokenRequest,
    responses(
        (status = 200, description = "Session token", body = TokenResponse),
        (status = 400, description = "Missing fields or invalid confirmation code"),
        (status = 404, description = "Unknown username")
    )
)]
pub async fn obtain_token(
    State(state): State<AppState>,
    ValidJson(payload): ValidJson<TokenRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let token = accounts::exchange_token(state.repo.as_ref(), &state.config, payload).await?;
    Ok(Json(token))
}
