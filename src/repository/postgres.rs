use async_trait::async_trait;
use sqlx::{FromRow, PgPool, Postgres, query_builder::QueryBuilder};
use std::collections::HashMap;
use uuid::Uuid;

use super::{RepoError, RepoResult, Repository, contains_pattern};
use crate::models::{
    Category, CategoryRequest, Comment, Genre, NewComment, NewReview, NewTitle, NewUser, Review,
    ReviewChanges, Title, TitleChanges, TitleFilter, UpdateUserRequest, User,
};

const USER_COLUMNS: &str = "id, username, email, first_name, last_name, bio, role, is_superuser";

const REVIEW_SELECT: &str = r#"
    SELECT r.id, r.title_id, r.author_id, u.username AS author, r.text, r.score, r.pub_date
    FROM reviews r JOIN users u ON u.id = r.author_id
"#;

const COMMENT_SELECT: &str = r#"
    SELECT c.id, c.review_id, c.author_id, u.username AS author, c.text, c.pub_date
    FROM comments c JOIN users u ON u.id = c.author_id
"#;

/// PostgresRepository
///
/// The `Repository` implementation backed by PostgreSQL. Uniqueness is enforced
/// by the constraints declared in `migrations/`; a violation surfaces through
/// `RepoError::from(sqlx::Error)` as `RepoError::Conflict`.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// TitleRow
///
/// One row of the title listing query: the title, its aggregated rating and
/// the flattened (optional) category.
#[derive(FromRow)]
struct TitleRow {
    id: i64,
    name: String,
    year: i32,
    description: Option<String>,
    rating: Option<f64>,
    category_id: Option<i64>,
    category_name: Option<String>,
    category_slug: Option<String>,
}

#[derive(FromRow)]
struct TitleGenreRow {
    title_id: i64,
    id: i64,
    name: String,
    slug: String,
}

impl TitleRow {
    fn into_title(self, genre: Vec<Genre>) -> Title {
        let category = match (self.category_id, self.category_name, self.category_slug) {
            (Some(id), Some(name), Some(slug)) => Some(Category { id, name, slug }),
            _ => None,
        };
        Title {
            id: self.id,
            name: self.name,
            year: self.year,
            description: self.description,
            rating: self.rating.map(|avg| avg.trunc() as i32),
            category,
            genre,
        }
    }
}

impl PostgresRepository {
    /// fetch_titles
    ///
    /// Runs the title listing query with the given filter (and optional id),
    /// then loads every matched title's genres in one extra round-trip.
    async fn fetch_titles(&self, filter: &TitleFilter, id: Option<i64>) -> RepoResult<Vec<Title>> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            r#"
            SELECT
                t.id, t.name, t.year, t.description,
                AVG(r.score)::FLOAT8 AS rating,
                c.id AS category_id, c.name AS category_name, c.slug AS category_slug
            FROM titles t
            LEFT JOIN categories c ON c.id = t.category_id
            LEFT JOIN reviews r ON r.title_id = t.id
            WHERE TRUE
            "#,
        );

        if let Some(id) = id {
            builder.push(" AND t.id = ");
            builder.push_bind(id);
        }
        if let Some(category) = &filter.category {
            builder.push(" AND c.slug = ");
            builder.push_bind(category.clone());
        }
        if let Some(genre) = &filter.genre {
            builder.push(
                " AND EXISTS (SELECT 1 FROM title_genres tg JOIN genres g ON g.id = tg.genre_id \
                 WHERE tg.title_id = t.id AND g.slug = ",
            );
            builder.push_bind(genre.clone());
            builder.push(")");
        }
        if let Some(name) = &filter.name {
            builder.push(" AND t.name ILIKE ");
            builder.push_bind(contains_pattern(name));
        }
        if let Some(year) = filter.year {
            builder.push(" AND t.year = ");
            builder.push_bind(year);
        }
        builder.push(" GROUP BY t.id, c.id ORDER BY t.id");

        let rows = builder
            .build_query_as::<TitleRow>()
            .fetch_all(&self.pool)
            .await?;

        if rows.is_empty() {
            return Ok(vec![]);
        }

        let ids: Vec<i64> = rows.iter().map(|row| row.id).collect();
        let genre_rows = sqlx::query_as::<_, TitleGenreRow>(
            r#"
            SELECT tg.title_id, g.id, g.name, g.slug
            FROM title_genres tg JOIN genres g ON g.id = tg.genre_id
            WHERE tg.title_id = ANY($1)
            ORDER BY g.name
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut genres_by_title: HashMap<i64, Vec<Genre>> = HashMap::new();
        for row in genre_rows {
            genres_by_title.entry(row.title_id).or_default().push(Genre {
                id: row.id,
                name: row.name,
                slug: row.slug,
            });
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let genre = genres_by_title.remove(&row.id).unwrap_or_default();
                row.into_title(genre)
            })
            .collect())
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    // --- USERS ---

    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn get_user_by_username(&self, username: &str) -> RepoResult<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1");
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn get_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// list_users
    ///
    /// `search` is matched case-insensitively anywhere in the username.
    async fn list_users(&self, search: Option<String>) -> RepoResult<Vec<User>> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {USER_COLUMNS} FROM users"));
        if let Some(s) = search {
            builder.push(" WHERE username ILIKE ");
            builder.push_bind(contains_pattern(&s));
        }
        builder.push(" ORDER BY username");
        Ok(builder
            .build_query_as::<User>()
            .fetch_all(&self.pool)
            .await?)
    }

    async fn create_user(&self, user: NewUser) -> RepoResult<User> {
        let query = format!(
            "INSERT INTO users (id, username, email, first_name, last_name, bio, role, is_superuser) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {USER_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(Uuid::new_v4())
            .bind(user.username)
            .bind(user.email)
            .bind(user.first_name)
            .bind(user.last_name)
            .bind(user.bio)
            .bind(user.role.as_str())
            .bind(user.is_superuser)
            .fetch_one(&self.pool)
            .await?)
    }

    /// update_user
    ///
    /// Uses `COALESCE` so only the provided fields are written.
    async fn update_user(&self, id: Uuid, changes: UpdateUserRequest) -> RepoResult<Option<User>> {
        let query = format!(
            r#"
            UPDATE users
            SET username = COALESCE($2, username),
                email = COALESCE($3, email),
                first_name = COALESCE($4, first_name),
                last_name = COALESCE($5, last_name),
                bio = COALESCE($6, bio),
                role = COALESCE($7, role)
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(id)
            .bind(changes.username)
            .bind(changes.email)
            .bind(changes.first_name)
            .bind(changes.last_name)
            .bind(changes.bio)
            .bind(changes.role.map(|role| role.as_str()))
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn delete_user(&self, id: Uuid) -> RepoResult<bool> {
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    // --- CATEGORIES & GENRES ---

    async fn list_categories(&self, search: Option<String>) -> RepoResult<Vec<Category>> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT id, name, slug FROM categories");
        if let Some(s) = search {
            builder.push(" WHERE name ILIKE ");
            builder.push_bind(contains_pattern(&s));
        }
        builder.push(" ORDER BY name");
        Ok(builder
            .build_query_as::<Category>()
            .fetch_all(&self.pool)
            .await?)
    }

    async fn get_category(&self, slug: &str) -> RepoResult<Option<Category>> {
        Ok(
            sqlx::query_as::<_, Category>("SELECT id, name, slug FROM categories WHERE slug = $1")
                .bind(slug)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn create_category(&self, req: CategoryRequest) -> RepoResult<Category> {
        Ok(sqlx::query_as::<_, Category>(
            "INSERT INTO categories (name, slug) VALUES ($1, $2) RETURNING id, name, slug",
        )
        .bind(req.name)
        .bind(req.slug)
        .fetch_one(&self.pool)
        .await?)
    }

    /// delete_category
    ///
    /// Titles in the category keep existing with `category_id = NULL`.
    async fn delete_category(&self, slug: &str) -> RepoResult<bool> {
        let res = sqlx::query("DELETE FROM categories WHERE slug = $1")
            .bind(slug)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn list_genres(&self, search: Option<String>) -> RepoResult<Vec<Genre>> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT id, name, slug FROM genres");
        if let Some(s) = search {
            builder.push(" WHERE name ILIKE ");
            builder.push_bind(contains_pattern(&s));
        }
        builder.push(" ORDER BY name");
        Ok(builder
            .build_query_as::<Genre>()
            .fetch_all(&self.pool)
            .await?)
    }

    async fn get_genre(&self, slug: &str) -> RepoResult<Option<Genre>> {
        Ok(
            sqlx::query_as::<_, Genre>("SELECT id, name, slug FROM genres WHERE slug = $1")
                .bind(slug)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn create_genre(&self, req: CategoryRequest) -> RepoResult<Genre> {
        Ok(sqlx::query_as::<_, Genre>(
            "INSERT INTO genres (name, slug) VALUES ($1, $2) RETURNING id, name, slug",
        )
        .bind(req.name)
        .bind(req.slug)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn delete_genre(&self, slug: &str) -> RepoResult<bool> {
        let res = sqlx::query("DELETE FROM genres WHERE slug = $1")
            .bind(slug)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    // --- TITLES ---

    async fn list_titles(&self, filter: &TitleFilter) -> RepoResult<Vec<Title>> {
        self.fetch_titles(filter, None).await
    }

    async fn get_title(&self, id: i64) -> RepoResult<Option<Title>> {
        Ok(self
            .fetch_titles(&TitleFilter::default(), Some(id))
            .await?
            .into_iter()
            .next())
    }

    /// create_title
    ///
    /// Inserts the title and its genre links in one transaction.
    async fn create_title(&self, title: NewTitle) -> RepoResult<Title> {
        let mut tx = self.pool.begin().await?;

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO titles (name, year, description, category_id) VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(title.name)
        .bind(title.year)
        .bind(title.description)
        .bind(title.category_id)
        .fetch_one(&mut *tx)
        .await?;

        for genre_id in title.genre_ids {
            sqlx::query(
                "INSERT INTO title_genres (title_id, genre_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
            .bind(id)
            .bind(genre_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        self.get_title(id).await?.ok_or(RepoError::NotFound)
    }

    /// update_title
    ///
    /// `COALESCE` partial update; a provided genre list replaces the old links.
    async fn update_title(&self, id: i64, changes: TitleChanges) -> RepoResult<Option<Title>> {
        let mut tx = self.pool.begin().await?;

        let res = sqlx::query(
            r#"
            UPDATE titles
            SET name = COALESCE($2, name),
                year = COALESCE($3, year),
                description = CASE WHEN $4 THEN $5 ELSE description END,
                category_id = CASE WHEN $6 THEN $7 ELSE category_id END
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(changes.name)
        .bind(changes.year)
        .bind(changes.description.is_some())
        .bind(changes.description.flatten())
        .bind(changes.category_id.is_some())
        .bind(changes.category_id.flatten())
        .execute(&mut *tx)
        .await?;

        if res.rows_affected() == 0 {
            return Ok(None);
        }

        if let Some(genre_ids) = changes.genre_ids {
            sqlx::query("DELETE FROM title_genres WHERE title_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            for genre_id in genre_ids {
                sqlx::query(
                    "INSERT INTO title_genres (title_id, genre_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
                )
                .bind(id)
                .bind(genre_id)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;

        self.get_title(id).await
    }

    async fn delete_title(&self, id: i64) -> RepoResult<bool> {
        let res = sqlx::query("DELETE FROM titles WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    // --- REVIEWS ---

    async fn list_reviews(&self, title_id: i64) -> RepoResult<Vec<Review>> {
        let query = format!("{REVIEW_SELECT} WHERE r.title_id = $1 ORDER BY r.pub_date, r.id");
        Ok(sqlx::query_as::<_, Review>(&query)
            .bind(title_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn get_review(&self, title_id: i64, review_id: i64) -> RepoResult<Option<Review>> {
        let query = format!("{REVIEW_SELECT} WHERE r.title_id = $1 AND r.id = $2");
        Ok(sqlx::query_as::<_, Review>(&query)
            .bind(title_id)
            .bind(review_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn review_exists(&self, title_id: i64, author_id: Uuid) -> RepoResult<bool> {
        Ok(sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM reviews WHERE title_id = $1 AND author_id = $2)",
        )
        .bind(title_id)
        .bind(author_id)
        .fetch_one(&self.pool)
        .await?)
    }

    /// create_review
    ///
    /// Insert and author join in a single CTE. A second review for the same
    /// (author, title) is rejected by `reviews_author_title_unique`, which is
    /// what makes concurrent creations safe.
    async fn create_review(&self, review: NewReview) -> RepoResult<Review> {
        Ok(sqlx::query_as::<_, Review>(
            r#"
            WITH inserted AS (
                INSERT INTO reviews (title_id, author_id, text, score)
                VALUES ($1, $2, $3, $4)
                RETURNING id, title_id, author_id, text, score, pub_date
            )
            SELECT i.id, i.title_id, i.author_id, u.username AS author, i.text, i.score, i.pub_date
            FROM inserted i JOIN users u ON u.id = i.author_id
            "#,
        )
        .bind(review.title_id)
        .bind(review.author_id)
        .bind(review.text)
        .bind(review.score)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn update_review(&self, id: i64, changes: ReviewChanges) -> RepoResult<Option<Review>> {
        Ok(sqlx::query_as::<_, Review>(
            r#"
            WITH updated AS (
                UPDATE reviews
                SET text = COALESCE($2, text),
                    score = COALESCE($3, score)
                WHERE id = $1
                RETURNING id, title_id, author_id, text, score, pub_date
            )
            SELECT u2.id, u2.title_id, u2.author_id, u.username AS author, u2.text, u2.score, u2.pub_date
            FROM updated u2 JOIN users u ON u.id = u2.author_id
            "#,
        )
        .bind(id)
        .bind(changes.text)
        .bind(changes.score)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn delete_review(&self, id: i64) -> RepoResult<bool> {
        let res = sqlx::query("DELETE FROM reviews WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    // --- COMMENTS ---

    async fn list_comments(&self, review_id: i64) -> RepoResult<Vec<Comment>> {
        let query = format!("{COMMENT_SELECT} WHERE c.review_id = $1 ORDER BY c.pub_date, c.id");
        Ok(sqlx::query_as::<_, Comment>(&query)
            .bind(review_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn get_comment(&self, review_id: i64, comment_id: i64) -> RepoResult<Option<Comment>> {
        let query = format!("{COMMENT_SELECT} WHERE c.review_id = $1 AND c.id = $2");
        Ok(sqlx::query_as::<_, Comment>(&query)
            .bind(review_id)
            .bind(comment_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn create_comment(&self, comment: NewComment) -> RepoResult<Comment> {
        Ok(sqlx::query_as::<_, Comment>(
            r#"
            WITH inserted AS (
                INSERT INTO comments (review_id, author_id, text)
                VALUES ($1, $2, $3)
                RETURNING id, review_id, author_id, text, pub_date
            )
            SELECT i.id, i.review_id, i.author_id, u.username AS author, i.text, i.pub_date
            FROM inserted i JOIN users u ON u.id = i.author_id
            "#,
        )
        .bind(comment.review_id)
        .bind(comment.author_id)
        .bind(comment.text)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn update_comment(&self, id: i64, text: Option<String>) -> RepoResult<Option<Comment>> {
        Ok(sqlx::query_as::<_, Comment>(
            r#"
            WITH updated AS (
                UPDATE comments SET text = COALESCE($2, text) WHERE id = $1
                RETURNING id, review_id, author_id, text, pub_date
            )
            SELECT u2.id, u2.review_id, u2.author_id, u.username AS author, u2.text, u2.pub_date
            FROM updated u2 JOIN users u ON u.id = u2.author_id
            "#,
        )
        .bind(id)
        .bind(text)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn delete_comment(&self, id: i64) -> RepoResult<bool> {
        let res = sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}
