use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Category, CategoryRequest, Comment, Genre, NewComment, NewReview, NewTitle, NewUser, Review,
    ReviewChanges, Title, TitleChanges, TitleFilter, UpdateUserRequest, User,
};

mod memory;
mod postgres;

pub use memory::InMemoryRepository;
pub use postgres::PostgresRepository;

/// RepoError
///
/// Storage failures as the rest of the application sees them. Uniqueness
/// violations keep the name of the violated constraint so the boundary can
/// attribute them to a field (see `ApiError::from`).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepoError {
    #[error("unique constraint '{constraint}' violated")]
    Conflict { constraint: String },

    /// A referenced row (foreign key target) does not exist.
    #[error("referenced row not found")]
    NotFound,

    #[error("database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for RepoError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return RepoError::Conflict {
                    constraint: db_err.constraint().unwrap_or("unknown").to_string(),
                };
            }
            if db_err.is_foreign_key_violation() {
                return RepoError::NotFound;
            }
        }
        tracing::error!("database error: {:?}", err);
        RepoError::Database(err.to_string())
    }
}

pub type RepoResult<T> = Result<T, RepoError>;

/// Builds an `ILIKE` pattern matching `term` as a literal substring. The
/// wildcards `%` and `_` and the escape character `\` in user input are
/// escaped so they match themselves, as they do in the in-memory store.
pub fn contains_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Repository Trait
///
/// The persistence contract. Handlers and the core operations only see this
/// trait, so the Postgres store and the in-memory store are interchangeable.
///
/// Implementations must enforce the uniqueness rules atomically (username,
/// email, category/genre slug, and one review per author and title) and report
/// violations as `RepoError::Conflict` carrying the constraint name.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>>;
    async fn get_user_by_username(&self, username: &str) -> RepoResult<Option<User>>;
    async fn get_user_by_email(&self, email: &str) -> RepoResult<Option<User>>;
    /// Case-insensitive substring match on username when `search` is set.
    async fn list_users(&self, search: Option<String>) -> RepoResult<Vec<User>>;
    async fn create_user(&self, user: NewUser) -> RepoResult<User>;
    /// Partial update; `None` fields are left untouched. Returns `None` if absent.
    async fn update_user(&self, id: Uuid, changes: UpdateUserRequest) -> RepoResult<Option<User>>;
    async fn delete_user(&self, id: Uuid) -> RepoResult<bool>;

    // --- Categories & Genres ---
    async fn list_categories(&self, search: Option<String>) -> RepoResult<Vec<Category>>;
    async fn get_category(&self, slug: &str) -> RepoResult<Option<Category>>;
    async fn create_category(&self, req: CategoryRequest) -> RepoResult<Category>;
    async fn delete_category(&self, slug: &str) -> RepoResult<bool>;

    async fn list_genres(&self, search: Option<String>) -> RepoResult<Vec<Genre>>;
    async fn get_genre(&self, slug: &str) -> RepoResult<Option<Genre>>;
    async fn create_genre(&self, req: CategoryRequest) -> RepoResult<Genre>;
    async fn delete_genre(&self, slug: &str) -> RepoResult<bool>;

    // --- Titles ---
    /// Titles carry a freshly computed `rating` on every read.
    async fn list_titles(&self, filter: &TitleFilter) -> RepoResult<Vec<Title>>;
    async fn get_title(&self, id: i64) -> RepoResult<Option<Title>>;
    async fn create_title(&self, title: NewTitle) -> RepoResult<Title>;
    async fn update_title(&self, id: i64, changes: TitleChanges) -> RepoResult<Option<Title>>;
    async fn delete_title(&self, id: i64) -> RepoResult<bool>;

    // --- Reviews ---
    async fn list_reviews(&self, title_id: i64) -> RepoResult<Vec<Review>>;
    /// Scoped to the parent title: a review under another title is `None`.
    async fn get_review(&self, title_id: i64, review_id: i64) -> RepoResult<Option<Review>>;
    /// Fast-path pre-check only; the insert is the authority.
    async fn review_exists(&self, title_id: i64, author_id: Uuid) -> RepoResult<bool>;
    /// Fails with `Conflict { constraint: "reviews_author_title_unique" }` on a duplicate.
    async fn create_review(&self, review: NewReview) -> RepoResult<Review>;
    async fn update_review(&self, id: i64, changes: ReviewChanges) -> RepoResult<Option<Review>>;
    async fn delete_review(&self, id: i64) -> RepoResult<bool>;

    // --- Comments ---
    async fn list_comments(&self, review_id: i64) -> RepoResult<Vec<Comment>>;
    async fn get_comment(&self, review_id: i64, comment_id: i64) -> RepoResult<Option<Comment>>;
    async fn create_comment(&self, comment: NewComment) -> RepoResult<Comment>;
    async fn update_comment(&self, id: i64, text: Option<String>) -> RepoResult<Option<Comment>>;
    async fn delete_comment(&self, id: i64) -> RepoResult<bool>;
}

/// RepositoryState
///
/// The shared handle stored in `AppState`.
pub type RepositoryState = Arc<dyn Repository>;
