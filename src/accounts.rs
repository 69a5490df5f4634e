//! Email-code authentication: `request_signup` issues a confirmation code for
//! a (username, email) identity and mails it; `exchange_token` trades a valid
//! code for a session token. The two halves are decoupled so the mail
//! round-trip happens out of band, and re-running signup with the same pair
//! simply issues a fresh code.

use crate::{
    auth::issue_token,
    config::AppConfig,
    confirmation::ConfirmationCodes,
    error::{ApiError, FieldErrors},
    mailer::{Mailer, OutgoingMail},
    models::{NewUser, SignupRequest, TokenRequest, TokenResponse, User},
    repository::{RepoError, Repository},
    validators,
};

/// request_signup
///
/// Validates the pair, gets or creates the account, mints a code bound to it
/// and hands the code to the mail collaborator.
///
/// A mail failure is returned as `ApiError::MailDelivery`; an account created
/// by this call is kept in that case.
pub async fn request_signup(
    repo: &dyn Repository,
    mailer: &dyn Mailer,
    config: &AppConfig,
    req: SignupRequest,
) -> Result<SignupRequest, ApiError> {
    let mut errors = FieldErrors::new();
    validators::validate_username(&req.username, &mut errors);
    validators::validate_email(&req.email, &mut errors);
    ApiError::check(errors)?;

    let user = get_or_create_user(repo, &req.username, &req.email).await?;

    let code = ConfirmationCodes::from_config(config)
        .make_code(&user)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    mailer
        .send(OutgoingMail {
            subject: format!("{}, your Confirmation code", user.username),
            body: code,
            from: config.admin_email.clone(),
            to: vec![user.email.clone()],
        })
        .await?;

    tracing::info!(username = %user.username, "confirmation code issued");
    Ok(req)
}

/// get_or_create_user
///
/// - same username, same email: the existing account (idempotent re-signup)
/// - same username, other email: error on `username`
/// - new username, email in use: error on `email`
///
/// The lookups only give a friendly error early. The insert is decided by the
/// store's unique constraints; when it loses a race to an identical signup, the
/// winner's row is returned.
async fn get_or_create_user(
    repo: &dyn Repository,
    username: &str,
    email: &str,
) -> Result<User, ApiError> {
    if let Some(existing) = repo.get_user_by_username(username).await? {
        if existing.email == email {
            return Ok(existing);
        }
        return Err(ApiError::field(
            "username",
            "A user with that username already exists.",
        ));
    }
    if repo.get_user_by_email(email).await?.is_some() {
        return Err(ApiError::field(
            "email",
            "A user with that email already exists.",
        ));
    }

    let new_user = NewUser {
        username: username.to_string(),
        email: email.to_string(),
        ..NewUser::default()
    };
    match repo.create_user(new_user).await {
        Ok(user) => {
            tracing::info!(username = %user.username, "user created via signup");
            Ok(user)
        }
        Err(RepoError::Conflict { constraint }) => match repo.get_user_by_username(username).await? {
            Some(existing) if existing.email == email => Ok(existing),
            _ => Err(RepoError::Conflict { constraint }.into()),
        },
        Err(e) => Err(e.into()),
    }
}

/// exchange_token
///
/// The only path that mints session tokens. Unknown username is `NotFound`; a
/// code that does not validate for that user is a field error on
/// `confirmation_code`.
pub async fn exchange_token(
    repo: &dyn Repository,
    config: &AppConfig,
    req: TokenRequest,
) -> Result<TokenResponse, ApiError> {
    let mut errors = FieldErrors::new();
    if req.username.is_empty() {
        errors
            .entry("username".to_string())
            .or_default()
            .push("This field is required.".to_string());
    }
    if req.confirmation_code.is_empty() {
        errors
            .entry("confirmation_code".to_string())
            .or_default()
            .push("This field is required.".to_string());
    }
    ApiError::check(errors)?;

    let user = repo
        .get_user_by_username(&req.username)
        .await?
        .ok_or(ApiError::NotFound)?;

    if let Err(e) = ConfirmationCodes::from_config(config).check_code(&user, &req.confirmation_code)
    {
        tracing::warn!(username = %user.username, reason = %e, "confirmation code rejected");
        return Err(ApiError::field(
            "confirmation_code",
            "Invalid confirmation code.",
        ));
    }

    let token = issue_token(&user, config)?;
    tracing::info!(username = %user.username, "session token issued");
    Ok(TokenResponse { token })
}
