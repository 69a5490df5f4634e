use axum::{
    Json,
    extract::{Path, State},
    http::{Method, StatusCode},
};

use crate::{
    AppState,
    auth::Actor,
    error::ApiError,
    extract::ValidJson,
    models::{
        Comment, CreateCommentRequest, CreateReviewRequest, Review, Title, UpdateCommentRequest,
        UpdateReviewRequest,
    },
    permissions::{Policy, Resource},
    repository::Repository,
    reviews,
};

const POLICY: Policy = Policy::ReviewComment;

async fn find_title(repo: &dyn Repository, title_id: i64) -> Result<Title, ApiError> {
    repo.get_title(title_id).await?.ok_or(ApiError::NotFound)
}

/// Resolves title first, then the review under it.
async fn find_review(
    repo: &dyn Repository,
    title_id: i64,
    review_id: i64,
) -> Result<Review, ApiError> {
    find_title(repo, title_id).await?;
    repo.get_review(title_id, review_id)
        .await?
        .ok_or(ApiError::NotFound)
}

async fn find_comment(
    repo: &dyn Repository,
    title_id: i64,
    review_id: i64,
    comment_id: i64,
) -> Result<Comment, ApiError> {
    find_review(repo, title_id, review_id).await?;
    repo.get_comment(review_id, comment_id)
        .await?
        .ok_or(ApiError::NotFound)
}

// --- Reviews ---

#[utoipa::path(
    get,
    path = "/api/v1/titles/{title_id}/reviews",
    params(("title_id" = i64, Path, description = "Title id")),
    responses(
        (status = 200, description = "Reviews of the title", body = [Review]),
        (status = 404, description = "Title not found")
    )
)]
pub async fn list_reviews(
    actor: Actor,
    State(state): State<AppState>,
    Path(title_id): Path<i64>,
) -> Result<Json<Vec<Review>>, ApiError> {
    POLICY.check(&actor, &Method::GET)?;
    find_title(state.repo.as_ref(), title_id).await?;
    Ok(Json(state.repo.list_reviews(title_id).await?))
}

/// create_review
///
/// [Authenticated Route] At most one review per author and title; a second
/// attempt is a 400 on `non_field_errors`.
#[utoipa::path(
    post,
    path = "/api/v1/titles/{title_id}/reviews",
    params(("title_id" = i64, Path, description = "Title id")),
    request_body = CreateReviewRequest,
    responses(
        (status = 201, description = "Created", body = Review),
        (status = 400, description = "Invalid score/text or duplicate review"),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "Title not found")
    )
)]
pub async fn create_review(
    actor: Actor,
    State(state): State<AppState>,
    Path(title_id): Path<i64>,
    ValidJson(payload): ValidJson<CreateReviewRequest>,
) -> Result<(StatusCode, Json<Review>), ApiError> {
    POLICY.check(&actor, &Method::POST)?;
    let author = actor.user().ok_or(ApiError::NotAuthenticated)?;
    let title = find_title(state.repo.as_ref(), title_id).await?;
    let review = reviews::create_review(state.repo.as_ref(), author, &title, payload).await?;
    Ok((StatusCode::CREATED, Json(review)))
}

#[utoipa::path(
    get,
    path = "/api/v1/titles/{title_id}/reviews/{review_id}",
    params(
        ("title_id" = i64, Path, description = "Title id"),
        ("review_id" = i64, Path, description = "Review id")
    ),
    responses(
        (status = 200, description = "Review", body = Review),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_review(
    actor: Actor,
    State(state): State<AppState>,
    Path((title_id, review_id)): Path<(i64, i64)>,
) -> Result<Json<Review>, ApiError> {
    POLICY.check(&actor, &Method::GET)?;
    let review = find_review(state.repo.as_ref(), title_id, review_id).await?;
    POLICY.check_object(&actor, &Method::GET, Resource::Review(&review))?;
    Ok(Json(review))
}

/// update_review
///
/// [Author / Moderator / Admin] Partial update of text and score.
#[utoipa::path(
    patch,
    path = "/api/v1/titles/{title_id}/reviews/{review_id}",
    params(
        ("title_id" = i64, Path, description = "Title id"),
        ("review_id" = i64, Path, description = "Review id")
    ),
    request_body = UpdateReviewRequest,
    responses(
        (status = 200, description = "Updated", body = Review),
        (status = 400, description = "Validation error"),
        (status = 403, description = "Not the author, a moderator or an admin"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_review(
    actor: Actor,
    State(state): State<AppState>,
    Path((title_id, review_id)): Path<(i64, i64)>,
    ValidJson(payload): ValidJson<UpdateReviewRequest>,
) -> Result<Json<Review>, ApiError> {
    POLICY.check(&actor, &Method::PATCH)?;
    let review = find_review(state.repo.as_ref(), title_id, review_id).await?;
    POLICY.check_object(&actor, &Method::PATCH, Resource::Review(&review))?;
    let updated = reviews::update_review(state.repo.as_ref(), &review, payload).await?;
    Ok(Json(updated))
}

#[utoipa::path(
    delete,
    path = "/api/v1/titles/{title_id}/reviews/{review_id}",
    params(
        ("title_id" = i64, Path, description = "Title id"),
        ("review_id" = i64, Path, description = "Review id")
    ),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not the author, a moderator or an admin"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_review(
    actor: Actor,
    State(state): State<AppState>,
    Path((title_id, review_id)): Path<(i64, i64)>,
) -> Result<StatusCode, ApiError> {
    POLICY.check(&actor, &Method::DELETE)?;
    let review = find_review(state.repo.as_ref(), title_id, review_id).await?;
    POLICY.check_object(&actor, &Method::DELETE, Resource::Review(&review))?;
    if state.repo.delete_review(review.id).await? {
        tracing::info!(review_id, title_id, "review deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound)
    }
}

// --- Comments ---

#[utoipa::path(
    get,
    path = "/api/v1/titles/{title_id}/reviews/{review_id}/comments",
    params(
        ("title_id" = i64, Path, description = "Title id"),
        ("review_id" = i64, Path, description = "Review id")
    ),
    responses(
        (status = 200, description = "Comments on the review", body = [Comment]),
        (status = 404, description = "Title or review not found")
    )
)]
pub async fn list_comments(
    actor: Actor,
    State(state): State<AppState>,
    Path((title_id, review_id)): Path<(i64, i64)>,
) -> Result<Json<Vec<Comment>>, ApiError> {
    POLICY.check(&actor, &Method::GET)?;
    find_review(state.repo.as_ref(), title_id, review_id).await?;
    Ok(Json(state.repo.list_comments(review_id).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/titles/{title_id}/reviews/{review_id}/comments",
    params(
        ("title_id" = i64, Path, description = "Title id"),
        ("review_id" = i64, Path, description = "Review id")
    ),
    request_body = CreateCommentRequest,
    responses(
        (status = 201, description = "Created", body = Comment),
        (status = 400, description = "Blank text"),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "Title or review not found")
    )
)]
pub async fn create_comment(
    actor: Actor,
    State(state): State<AppState>,
    Path((title_id, review_id)): Path<(i64, i64)>,
    ValidJson(payload): ValidJson<CreateCommentRequest>,
) -> Result<(StatusCode, Json<Comment>), ApiError> {
    POLICY.check(&actor, &Method::POST)?;
    let author = actor.user().ok_or(ApiError::NotAuthenticated)?;
    let review = find_review(state.repo.as_ref(), title_id, review_id).await?;
    let comment = reviews::create_comment(state.repo.as_ref(), author, &review, payload).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

#[utoipa::path(
    get,
    path = "/api/v1/titles/{title_id}/reviews/{review_id}/comments/{comment_id}",
    params(
        ("title_id" = i64, Path, description = "Title id"),
        ("review_id" = i64, Path, description = "Review id"),
        ("comment_id" = i64, Path, description = "Comment id")
    ),
    responses(
        (status = 200, description = "Comment", body = Comment),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_comment(
    actor: Actor,
    State(state): State<AppState>,
    Path((title_id, review_id, comment_id)): Path<(i64, i64, i64)>,
) -> Result<Json<Comment>, ApiError> {
    POLICY.check(&actor, &Method::GET)?;
    let comment = find_comment(state.repo.as_ref(), title_id, review_id, comment_id).await?;
    POLICY.check_object(&actor, &Method::GET, Resource::Comment(&comment))?;
    Ok(Json(comment))
}

#[utoipa::path(
    patch,
    path = "/api/v1/titles/{title_id}/reviews/{review_id}/comments/{comment_id}",
    params(
        ("title_id" = i64, Path, description = "Title id"),
        ("review_id" = i64, Path, description = "Review id"),
        ("comment_id" = i64, Path, description = "Comment id")
    ),
    request_body = UpdateCommentRequest,
    responses(
        (status = 200, description = "Updated", body = Comment),
        (status = 403, description = "Not the author, a moderator or an admin"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_comment(
    actor: Actor,
    State(state): State<AppState>,
    Path((title_id, review_id, comment_id)): Path<(i64, i64, i64)>,
    ValidJson(payload): ValidJson<UpdateCommentRequest>,
) -> Result<Json<Comment>, ApiError> {
    POLICY.check(&actor, &Method::PATCH)?;
    let comment = find_comment(state.repo.as_ref(), title_id, review_id, comment_id).await?;
    POLICY.check_object(&actor, &Method::PATCH, Resource::Comment(&comment))?;
    let updated = reviews::update_comment(state.repo.as_ref(), &comment, payload).await?;
    Ok(Json(updated))
}

#[utoipa::path(
    delete,
    path = "/api/v1/titles/{title_id}/reviews/{review_id}/comments/{comment_id}",
    params(
        ("title_id" = i64, Path, description = "Title id"),
        ("review_id" = i64, Path, description = "Review id"),
        ("comment_id" = i64, Path, description = "Comment id")
    ),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not the author, a moderator or an admin"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_comment(
    actor: Actor,
    State(state): State<AppState>,
    Path((title_id, review_id, comment_id)): Path<(i64, i64, i64)>,
) -> Result<StatusCode, ApiError> {
    POLICY.check(&actor, &Method::DELETE)?;
    let comment = find_comment(state.repo.as_ref(), title_id, review_id, comment_id).await?;
    POLICY.check_object(&actor, &Method::DELETE, Resource::Comment(&comment))?;
    if state.repo.delete_comment(comment.id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound)
    }
}
