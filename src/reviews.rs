//! Review and comment writes.
//!
//! The parent (title or review) is resolved by the caller from the URL and
//! passed in explicitly, together with the acting user. Authorization has
//! already happened by the time these run.

use crate::{
    auth::AuthUser,
    error::{ApiError, FieldErrors, NON_FIELD_ERRORS},
    models::{
        Comment, CreateCommentRequest, CreateReviewRequest, NewComment, NewReview, Review,
        ReviewChanges, Title, UpdateCommentRequest, UpdateReviewRequest,
    },
    repository::Repository,
    validators,
};

pub const DUPLICATE_REVIEW: &str = "You have already reviewed this title.";

/// create_review
///
/// One review per (author, title). The `review_exists` lookup only produces
/// the error early; under concurrent creates the storage constraint decides,
/// and the loser gets the same validation error through `From<RepoError>`.
pub async fn create_review(
    repo: &dyn Repository,
    author: &AuthUser,
    title: &Title,
    req: CreateReviewRequest,
) -> Result<Review, ApiError> {
    let mut errors = FieldErrors::new();
    validators::validate_text(&req.text, &mut errors);
    validators::validate_score(req.score, &mut errors);
    ApiError::check(errors)?;

    if repo.review_exists(title.id, author.id).await? {
        return Err(ApiError::field(NON_FIELD_ERRORS, DUPLICATE_REVIEW));
    }

    let review = repo
        .create_review(NewReview {
            title_id: title.id,
            author_id: author.id,
            text: req.text,
            score: req.score,
        })
        .await?;

    tracing::info!(
        review_id = review.id,
        title_id = title.id,
        author = %author.username,
        "review created"
    );
    Ok(review)
}

/// update_review
///
/// Partial update of text and/or score. Neither the author nor the title can
/// change, so no uniqueness check applies.
pub async fn update_review(
    repo: &dyn Repository,
    review: &Review,
    req: UpdateReviewRequest,
) -> Result<Review, ApiError> {
    let mut errors = FieldErrors::new();
    if let Some(text) = &req.text {
        validators::validate_text(text, &mut errors);
    }
    if let Some(score) = req.score {
        validators::validate_score(score, &mut errors);
    }
    ApiError::check(errors)?;

    repo.update_review(
        review.id,
        ReviewChanges {
            text: req.text,
            score: req.score,
        },
    )
    .await?
    .ok_or(ApiError::NotFound)
}

pub async fn create_comment(
    repo: &dyn Repository,
    author: &AuthUser,
    review: &Review,
    req: CreateCommentRequest,
) -> Result<Comment, ApiError> {
    let mut errors = FieldErrors::new();
    validators::validate_text(&req.text, &mut errors);
    ApiError::check(errors)?;

    let comment = repo
        .create_comment(NewComment {
            review_id: review.id,
            author_id: author.id,
            text: req.text,
        })
        .await?;

    tracing::debug!(comment_id = comment.id, review_id = review.id, "comment created");
    Ok(comment)
}

pub async fn update_comment(
    repo: &dyn Repository,
    comment: &Comment,
    req: UpdateCommentRequest,
) -> Result<Comment, ApiError> {
    let mut errors = FieldErrors::new();
    if let Some(text) = &req.text {
        validators::validate_text(text, &mut errors);
    }
    ApiError::check(errors)?;

    repo.update_comment(comment.id, req.text)
        .await?
        .ok_or(ApiError::NotFound)
}
