use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::{RepoError, RepoResult, Repository};
use crate::models::{
    Category, CategoryRequest, Comment, Genre, NewComment, NewReview, NewTitle, NewUser, Review,
    ReviewChanges, Title, TitleChanges, TitleFilter, UpdateUserRequest, User,
};

#[derive(Debug, Clone)]
struct StoredTitle {
    id: i64,
    name: String,
    year: i32,
    description: Option<String>,
    category_id: Option<i64>,
    genre_ids: Vec<i64>,
}

#[derive(Debug, Clone)]
struct StoredReview {
    id: i64,
    title_id: i64,
    author_id: Uuid,
    text: String,
    score: i32,
    pub_date: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct StoredComment {
    id: i64,
    review_id: i64,
    author_id: Uuid,
    text: String,
    pub_date: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct MemoryState {
    users: Vec<User>,
    categories: Vec<Category>,
    genres: Vec<Genre>,
    titles: Vec<StoredTitle>,
    reviews: Vec<StoredReview>,
    comments: Vec<StoredComment>,
    next_id: i64,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn username_of(&self, id: Uuid) -> String {
        self.users
            .iter()
            .find(|u| u.id == id)
            .map(|u| u.username.clone())
            .unwrap_or_default()
    }

    fn check_user_unique(&self, id: Option<Uuid>, username: &str, email: &str) -> RepoResult<()> {
        let others = self.users.iter().filter(|u| Some(u.id) != id);
        for user in others {
            if user.username == username {
                return Err(conflict("users_username_unique"));
            }
            if user.email == email {
                return Err(conflict("users_email_unique"));
            }
        }
        Ok(())
    }

    fn review(&self, stored: &StoredReview) -> Review {
        Review {
            id: stored.id,
            title_id: stored.title_id,
            author_id: stored.author_id,
            author: self.username_of(stored.author_id),
            text: stored.text.clone(),
            score: stored.score,
            pub_date: stored.pub_date,
        }
    }

    fn comment(&self, stored: &StoredComment) -> Comment {
        Comment {
            id: stored.id,
            review_id: stored.review_id,
            author_id: stored.author_id,
            author: self.username_of(stored.author_id),
            text: stored.text.clone(),
            pub_date: stored.pub_date,
        }
    }

    /// Assembles the public `Title`, computing the rating from the reviews
    /// present right now.
    fn title(&self, stored: &StoredTitle) -> Title {
        let scores: Vec<i32> = self
            .reviews
            .iter()
            .filter(|r| r.title_id == stored.id)
            .map(|r| r.score)
            .collect();
        let rating = if scores.is_empty() {
            None
        } else {
            let sum: i64 = scores.iter().map(|s| i64::from(*s)).sum();
            Some((sum as f64 / scores.len() as f64).trunc() as i32)
        };
        let mut genre: Vec<Genre> = self
            .genres
            .iter()
            .filter(|g| stored.genre_ids.contains(&g.id))
            .cloned()
            .collect();
        genre.sort_by(|a, b| a.name.cmp(&b.name));
        Title {
            id: stored.id,
            name: stored.name.clone(),
            year: stored.year,
            description: stored.description.clone(),
            rating,
            category: stored
                .category_id
                .and_then(|id| self.categories.iter().find(|c| c.id == id).cloned()),
            genre,
        }
    }

    fn remove_reviews_where(&mut self, pred: impl Fn(&StoredReview) -> bool) {
        let removed: Vec<i64> = self
            .reviews
            .iter()
            .filter(|r| pred(r))
            .map(|r| r.id)
            .collect();
        self.reviews.retain(|r| !removed.contains(&r.id));
        self.comments.retain(|c| !removed.contains(&c.review_id));
    }
}

fn conflict(constraint: &str) -> RepoError {
    RepoError::Conflict {
        constraint: constraint.to_string(),
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// InMemoryRepository
///
/// A `Repository` kept entirely in process memory, used by the test suites and
/// for running the API without a database. Every operation holds the single
/// state mutex for its whole duration, so check-then-insert is atomic and the
/// uniqueness rules behave like the Postgres constraints under concurrency.
/// Deletes cascade the same way the schema does.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    state: Mutex<MemoryState>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> RepoResult<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| RepoError::Database("in-memory state poisoned".to_string()))
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    // --- USERS ---

    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>> {
        let state = self.lock()?;
        Ok(state.users.iter().find(|u| u.id == id).cloned())
    }

    async fn get_user_by_username(&self, username: &str) -> RepoResult<Option<User>> {
        let state = self.lock()?;
        Ok(state.users.iter().find(|u| u.username == username).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        let state = self.lock()?;
        Ok(state.users.iter().find(|u| u.email == email).cloned())
    }

    async fn list_users(&self, search: Option<String>) -> RepoResult<Vec<User>> {
        let state = self.lock()?;
        let mut users: Vec<User> = state
            .users
            .iter()
            .filter(|u| search.as_deref().is_none_or(|s| contains_ci(&u.username, s)))
            .cloned()
            .collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(users)
    }

    async fn create_user(&self, user: NewUser) -> RepoResult<User> {
        let mut state = self.lock()?;
        state.check_user_unique(None, &user.username, &user.email)?;
        let created = User {
            id: Uuid::new_v4(),
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            bio: user.bio,
            role: user.role,
            is_superuser: user.is_superuser,
        };
        state.users.push(created.clone());
        Ok(created)
    }

    async fn update_user(&self, id: Uuid, changes: UpdateUserRequest) -> RepoResult<Option<User>> {
        let mut state = self.lock()?;
        let Some(current) = state.users.iter().find(|u| u.id == id).cloned() else {
            return Ok(None);
        };
        let username = changes.username.unwrap_or(current.username);
        let email = changes.email.unwrap_or(current.email);
        state.check_user_unique(Some(id), &username, &email)?;

        let updated = User {
            id,
            username,
            email,
            first_name: changes.first_name.or(current.first_name),
            last_name: changes.last_name.or(current.last_name),
            bio: changes.bio.or(current.bio),
            role: changes.role.unwrap_or(current.role),
            is_superuser: current.is_superuser,
        };
        if let Some(slot) = state.users.iter_mut().find(|u| u.id == id) {
            *slot = updated.clone();
        }
        Ok(Some(updated))
    }

    async fn delete_user(&self, id: Uuid) -> RepoResult<bool> {
        let mut state = self.lock()?;
        let before = state.users.len();
        state.users.retain(|u| u.id != id);
        if state.users.len() == before {
            return Ok(false);
        }
        state.remove_reviews_where(|r| r.author_id == id);
        state.comments.retain(|c| c.author_id != id);
        Ok(true)
    }

    // --- CATEGORIES & GENRES ---

    async fn list_categories(&self, search: Option<String>) -> RepoResult<Vec<Category>> {
        let state = self.lock()?;
        let mut categories: Vec<Category> = state
            .categories
            .iter()
            .filter(|c| search.as_deref().is_none_or(|s| contains_ci(&c.name, s)))
            .cloned()
            .collect();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn get_category(&self, slug: &str) -> RepoResult<Option<Category>> {
        let state = self.lock()?;
        Ok(state.categories.iter().find(|c| c.slug == slug).cloned())
    }

    async fn create_category(&self, req: CategoryRequest) -> RepoResult<Category> {
        let mut state = self.lock()?;
        if state.categories.iter().any(|c| c.slug == req.slug) {
            return Err(conflict("categories_slug_unique"));
        }
        let category = Category {
            id: state.next_id(),
            name: req.name,
            slug: req.slug,
        };
        state.categories.push(category.clone());
        Ok(category)
    }

    async fn delete_category(&self, slug: &str) -> RepoResult<bool> {
        let mut state = self.lock()?;
        let Some(id) = state.categories.iter().find(|c| c.slug == slug).map(|c| c.id) else {
            return Ok(false);
        };
        state.categories.retain(|c| c.id != id);
        for title in state.titles.iter_mut() {
            if title.category_id == Some(id) {
                title.category_id = None;
            }
        }
        Ok(true)
    }

    async fn list_genres(&self, search: Option<String>) -> RepoResult<Vec<Genre>> {
        let state = self.lock()?;
        let mut genres: Vec<Genre> = state
            .genres
            .iter()
            .filter(|g| search.as_deref().is_none_or(|s| contains_ci(&g.name, s)))
            .cloned()
            .collect();
        genres.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(genres)
    }

    async fn get_genre(&self, slug: &str) -> RepoResult<Option<Genre>> {
        let state = self.lock()?;
        Ok(state.genres.iter().find(|g| g.slug == slug).cloned())
    }

    async fn create_genre(&self, req: CategoryRequest) -> RepoResult<Genre> {
        let mut state = self.lock()?;
        if state.genres.iter().any(|g| g.slug == req.slug) {
            return Err(conflict("genres_slug_unique"));
        }
        let genre = Genre {
            id: state.next_id(),
            name: req.name,
            slug: req.slug,
        };
        state.genres.push(genre.clone());
        Ok(genre)
    }

    async fn delete_genre(&self, slug: &str) -> RepoResult<bool> {
        let mut state = self.lock()?;
        let Some(id) = state.genres.iter().find(|g| g.slug == slug).map(|g| g.id) else {
            return Ok(false);
        };
        state.genres.retain(|g| g.id != id);
        for title in state.titles.iter_mut() {
            title.genre_ids.retain(|g| *g != id);
        }
        Ok(true)
    }

    // --- TITLES ---

    async fn list_titles(&self, filter: &TitleFilter) -> RepoResult<Vec<Title>> {
        let state = self.lock()?;
        let titles = state
            .titles
            .iter()
            .map(|stored| state.title(stored))
            .filter(|t| {
                filter.category.as_deref().is_none_or(|slug| {
                    t.category.as_ref().is_some_and(|c| c.slug == slug)
                })
            })
            .filter(|t| {
                filter
                    .genre
                    .as_deref()
                    .is_none_or(|slug| t.genre.iter().any(|g| g.slug == slug))
            })
            .filter(|t| filter.name.as_deref().is_none_or(|n| contains_ci(&t.name, n)))
            .filter(|t| filter.year.is_none_or(|y| t.year == y))
            .collect();
        Ok(titles)
    }

    async fn get_title(&self, id: i64) -> RepoResult<Option<Title>> {
        let state = self.lock()?;
        Ok(state
            .titles
            .iter()
            .find(|t| t.id == id)
            .map(|stored| state.title(stored)))
    }

    async fn create_title(&self, title: NewTitle) -> RepoResult<Title> {
        let mut state = self.lock()?;
        if let Some(category_id) = title.category_id {
            if !state.categories.iter().any(|c| c.id == category_id) {
                return Err(RepoError::NotFound);
            }
        }
        if !title
            .genre_ids
            .iter()
            .all(|id| state.genres.iter().any(|g| g.id == *id))
        {
            return Err(RepoError::NotFound);
        }
        let mut genre_ids = title.genre_ids;
        genre_ids.sort_unstable();
        genre_ids.dedup();
        let stored = StoredTitle {
            id: state.next_id(),
            name: title.name,
            year: title.year,
            description: title.description,
            category_id: title.category_id,
            genre_ids,
        };
        let created = state.title(&stored);
        state.titles.push(stored);
        Ok(created)
    }

    async fn update_title(&self, id: i64, changes: TitleChanges) -> RepoResult<Option<Title>> {
        let mut state = self.lock()?;
        let Some(index) = state.titles.iter().position(|t| t.id == id) else {
            return Ok(None);
        };
        let stored = &mut state.titles[index];
        if let Some(name) = changes.name {
            stored.name = name;
        }
        if let Some(year) = changes.year {
            stored.year = year;
        }
        if let Some(description) = changes.description {
            stored.description = description;
        }
        if let Some(category_id) = changes.category_id {
            stored.category_id = category_id;
        }
        if let Some(mut genre_ids) = changes.genre_ids {
            genre_ids.sort_unstable();
            genre_ids.dedup();
            stored.genre_ids = genre_ids;
        }
        let stored = state.titles[index].clone();
        Ok(Some(state.title(&stored)))
    }

    async fn delete_title(&self, id: i64) -> RepoResult<bool> {
        let mut state = self.lock()?;
        let before = state.titles.len();
        state.titles.retain(|t| t.id != id);
        if state.titles.len() == before {
            return Ok(false);
        }
        state.remove_reviews_where(|r| r.title_id == id);
        Ok(true)
    }

    // --- REVIEWS ---

    async fn list_reviews(&self, title_id: i64) -> RepoResult<Vec<Review>> {
        let state = self.lock()?;
        Ok(state
            .reviews
            .iter()
            .filter(|r| r.title_id == title_id)
            .map(|r| state.review(r))
            .collect())
    }

    async fn get_review(&self, title_id: i64, review_id: i64) -> RepoResult<Option<Review>> {
        let state = self.lock()?;
        Ok(state
            .reviews
            .iter()
            .find(|r| r.title_id == title_id && r.id == review_id)
            .map(|r| state.review(r)))
    }

    async fn review_exists(&self, title_id: i64, author_id: Uuid) -> RepoResult<bool> {
        let state = self.lock()?;
        Ok(state
            .reviews
            .iter()
            .any(|r| r.title_id == title_id && r.author_id == author_id))
    }

    async fn create_review(&self, review: NewReview) -> RepoResult<Review> {
        let mut state = self.lock()?;
        if !state.titles.iter().any(|t| t.id == review.title_id)
            || !state.users.iter().any(|u| u.id == review.author_id)
        {
            return Err(RepoError::NotFound);
        }
        if state
            .reviews
            .iter()
            .any(|r| r.title_id == review.title_id && r.author_id == review.author_id)
        {
            return Err(conflict("reviews_author_title_unique"));
        }
        let stored = StoredReview {
            id: state.next_id(),
            title_id: review.title_id,
            author_id: review.author_id,
            text: review.text,
            score: review.score,
            pub_date: Utc::now(),
        };
        let created = state.review(&stored);
        state.reviews.push(stored);
        Ok(created)
    }

    async fn update_review(&self, id: i64, changes: ReviewChanges) -> RepoResult<Option<Review>> {
        let mut state = self.lock()?;
        let Some(stored) = state.reviews.iter_mut().find(|r| r.id == id) else {
            return Ok(None);
        };
        if let Some(text) = changes.text {
            stored.text = text;
        }
        if let Some(score) = changes.score {
            stored.score = score;
        }
        let stored = stored.clone();
        Ok(Some(state.review(&stored)))
    }

    async fn delete_review(&self, id: i64) -> RepoResult<bool> {
        let mut state = self.lock()?;
        let existed = state.reviews.iter().any(|r| r.id == id);
        state.remove_reviews_where(|r| r.id == id);
        Ok(existed)
    }

    // --- COMMENTS ---

    async fn list_comments(&self, review_id: i64) -> RepoResult<Vec<Comment>> {
        let state = self.lock()?;
        Ok(state
            .comments
            .iter()
            .filter(|c| c.review_id == review_id)
            .map(|c| state.comment(c))
            .collect())
    }

    async fn get_comment(&self, review_id: i64, comment_id: i64) -> RepoResult<Option<Comment>> {
        let state = self.lock()?;
        Ok(state
            .comments
            .iter()
            .find(|c| c.review_id == review_id && c.id == comment_id)
            .map(|c| state.comment(c)))
    }

    async fn create_comment(&self, comment: NewComment) -> RepoResult<Comment> {
        let mut state = self.lock()?;
        if !state.reviews.iter().any(|r| r.id == comment.review_id)
            || !state.users.iter().any(|u| u.id == comment.author_id)
        {
            return Err(RepoError::NotFound);
        }
        let stored = StoredComment {
            id: state.next_id(),
            review_id: comment.review_id,
            author_id: comment.author_id,
            text: comment.text,
            pub_date: Utc::now(),
        };
        let created = state.comment(&stored);
        state.comments.push(stored);
        Ok(created)
    }

    async fn update_comment(&self, id: i64, text: Option<String>) -> RepoResult<Option<Comment>> {
        let mut state = self.lock()?;
        let Some(stored) = state.comments.iter_mut().find(|c| c.id == id) else {
            return Ok(None);
        };
        if let Some(text) = text {
            stored.text = text;
        }
        let stored = stored.clone();
        Ok(Some(state.comment(&stored)))
    }

    async fn delete_comment(&self, id: i64) -> RepoResult<bool> {
        let mut state = self.lock()?;
        let before = state.comments.len();
        state.comments.retain(|c| c.id != id);
        Ok(state.comments.len() != before)
    }
}
