use axum::{
    Json,
    extract::{Path, Query, State},
    http::{Method, StatusCode},
};

use crate::{
    AppState,
    auth::Actor,
    error::{ApiError, FieldErrors},
    extract::ValidJson,
    models::{
        CreateUserRequest, NewUser, SearchFilter, UpdateMeRequest, UpdateUserRequest, User,
        UserProfile,
    },
    permissions::Policy,
    repository::Repository,
    validators,
};

fn validate_changes(changes: &UpdateUserRequest) -> Result<(), ApiError> {
    let mut errors = FieldErrors::new();
    if let Some(username) = &changes.username {
        validators::validate_username(username, &mut errors);
    }
    if let Some(email) = &changes.email {
        validators::validate_email(email, &mut errors);
    }
    validators::validate_profile_field("first_name", changes.first_name.as_deref(), &mut errors);
    validators::validate_profile_field("last_name", changes.last_name.as_deref(), &mut errors);
    ApiError::check(errors)
}

async fn find_user(repo: &dyn Repository, username: &str) -> Result<User, ApiError> {
    repo.get_user_by_username(username)
        .await?
        .ok_or(ApiError::NotFound)
}

/// list_users
///
/// [Admin Route] Optional `?search=` on the username.
#[utoipa::path(
    get,
    path = "/api/v1/users",
    params(SearchFilter),
    responses(
        (status = 200, description = "Users", body = [UserProfile]),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not an admin")
    )
)]
pub async fn list_users(
    actor: Actor,
    State(state): State<AppState>,
    Query(filter): Query<SearchFilter>,
) -> Result<Json<Vec<UserProfile>>, ApiError> {
    Policy::AdminOnly.check(&actor, &Method::GET)?;
    let users = state.repo.list_users(filter.search).await?;
    Ok(Json(users.into_iter().map(UserProfile::from).collect()))
}

/// create_user
///
/// [Admin Route] Unlike signup, the role may be chosen. No code is mailed.
#[utoipa::path(
    post,
    path = "/api/v1/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "Created", body = UserProfile),
        (status = 400, description = "Validation error"),
        (status = 403, description = "Not an admin")
    )
)]
pub async fn create_user(
    actor: Actor,
    State(state): State<AppState>,
    ValidJson(payload): ValidJson<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserProfile>), ApiError> {
    Policy::AdminOnly.check(&actor, &Method::POST)?;

    let mut errors = FieldErrors::new();
    validators::validate_username(&payload.username, &mut errors);
    validators::validate_email(&payload.email, &mut errors);
    validators::validate_profile_field("first_name", payload.first_name.as_deref(), &mut errors);
    validators::validate_profile_field("last_name", payload.last_name.as_deref(), &mut errors);
    ApiError::check(errors)?;

    let user = state
        .repo
        .create_user(NewUser {
            username: payload.username,
            email: payload.email,
            first_name: payload.first_name,
            last_name: payload.last_name,
            bio: payload.bio,
            role: payload.role.unwrap_or_default(),
            is_superuser: false,
        })
        .await?;
    tracing::info!(username = %user.username, role = %user.role, "user created by admin");
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[utoipa::path(
    get,
    path = "/api/v1/users/{username}",
    params(("username" = String, Path, description = "Username")),
    responses(
        (status = 200, description = "User", body = UserProfile),
        (status = 403, description = "Not an admin"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_user(
    actor: Actor,
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<UserProfile>, ApiError> {
    Policy::AdminOnly.check(&actor, &Method::GET)?;
    let user = find_user(state.repo.as_ref(), &username).await?;
    Ok(Json(user.into()))
}

/// update_user
///
/// [Admin Route] Partial update, including `role`.
#[utoipa::path(
    patch,
    path = "/api/v1/users/{username}",
    params(("username" = String, Path, description = "Username")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Updated", body = UserProfile),
        (status = 400, description = "Validation error"),
        (status = 403, description = "Not an admin"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_user(
    actor: Actor,
    State(state): State<AppState>,
    Path(username): Path<String>,
    ValidJson(payload): ValidJson<UpdateUserRequest>,
) -> Result<Json<UserProfile>, ApiError> {
    Policy::AdminOnly.check(&actor, &Method::PATCH)?;
    let user = find_user(state.repo.as_ref(), &username).await?;
    validate_changes(&payload)?;
    let updated = state
        .repo
        .update_user(user.id, payload)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(updated.into()))
}

#[utoipa::path(
    delete,
    path = "/api/v1/users/{username}",
    params(("username" = String, Path, description = "Username")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not an admin"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_user(
    actor: Actor,
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<StatusCode, ApiError> {
    Policy::AdminOnly.check(&actor, &Method::DELETE)?;
    let user = find_user(state.repo.as_ref(), &username).await?;
    if state.repo.delete_user(user.id).await? {
        tracing::info!(username = %user.username, "user deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound)
    }
}

// --- Self-service ---

/// get_me
///
/// [Authenticated Route] The caller's own profile.
#[utoipa::path(
    get,
    path = "/api/v1/users/me",
    responses(
        (status = 200, description = "Own profile", body = UserProfile),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn get_me(
    actor: Actor,
    State(state): State<AppState>,
) -> Result<Json<UserProfile>, ApiError> {
    Policy::Authenticated.check(&actor, &Method::GET)?;
    let id = actor.id().ok_or(ApiError::NotAuthenticated)?;
    let user = state
        .repo
        .get_user(id)
        .await?
        .ok_or(ApiError::NotAuthenticated)?;
    Ok(Json(user.into()))
}

/// update_me
///
/// [Authenticated Route] Partial update of the caller's own profile. A `role`
/// key in the body is dropped during deserialization and never reaches storage.
#[utoipa::path(
    patch,
    path = "/api/v1/users/me",
    request_body = UpdateMeRequest,
    responses(
        (status = 200, description = "Updated", body = UserProfile),
        (status = 400, description = "Validation error"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn update_me(
    actor: Actor,
    State(state): State<AppState>,
    ValidJson(payload): ValidJson<UpdateMeRequest>,
) -> Result<Json<UserProfile>, ApiError> {
    Policy::Authenticated.check(&actor, &Method::PATCH)?;
    let id = actor.id().ok_or(ApiError::NotAuthenticated)?;
    let changes = UpdateUserRequest::from(payload);
    validate_changes(&changes)?;
    let updated = state
        .repo
        .update_user(id, changes)
        .await?
        .ok_or(ApiError::NotAuthenticated)?;
    Ok(Json(updated.into()))
}
