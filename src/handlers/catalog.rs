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
        Category, CategoryRequest, CreateTitleRequest, Genre, NewTitle, SearchFilter, Title,
        TitleChanges, TitleFilter, UpdateTitleRequest,
    },
    permissions::Policy,
    repository::Repository,
    validators,
};

const POLICY: Policy = Policy::ReadOnlyOrAdmin;

fn validate_category_request(req: &CategoryRequest) -> Result<(), ApiError> {
    let mut errors = FieldErrors::new();
    validators::validate_name(&req.name, &mut errors);
    validators::validate_slug(&req.slug, &mut errors);
    ApiError::check(errors)
}

fn missing_slug(errors: &mut FieldErrors, field: &str, slug: &str) {
    errors
        .entry(field.to_string())
        .or_default()
        .push(format!("Object with slug={slug} does not exist."));
}

/// Resolves the category slug and genre slugs of a title write into ids.
/// Unknown slugs are recorded against `category` / `genre`.
async fn resolve_refs(
    repo: &dyn Repository,
    category: Option<&str>,
    genres: Option<&[String]>,
    errors: &mut FieldErrors,
) -> Result<(Option<i64>, Option<Vec<i64>>), ApiError> {
    let category_id = match category {
        Some(slug) => match repo.get_category(slug).await? {
            Some(category) => Some(category.id),
            None => {
                missing_slug(errors, "category", slug);
                None
            }
        },
        None => None,
    };

    let genre_ids = match genres {
        Some(slugs) => {
            let mut ids = Vec::with_capacity(slugs.len());
            for slug in slugs {
                match repo.get_genre(slug).await? {
                    Some(genre) => ids.push(genre.id),
                    None => missing_slug(errors, "genre", slug),
                }
            }
            Some(ids)
        }
        None => None,
    };

    Ok((category_id, genre_ids))
}

// --- Categories ---

/// list_categories
///
/// [Public Route] Optional `?search=` on the category name.
#[utoipa::path(
    get,
    path = "/api/v1/categories",
    params(SearchFilter),
    responses((status = 200, description = "Categories", body = [Category]))
)]
pub async fn list_categories(
    actor: Actor,
    State(state): State<AppState>,
    Query(filter): Query<SearchFilter>,
) -> Result<Json<Vec<Category>>, ApiError> {
    POLICY.check(&actor, &Method::GET)?;
    Ok(Json(state.repo.list_categories(filter.search).await?))
}

/// create_category
///
/// [Admin Route]
#[utoipa::path(
    post,
    path = "/api/v1/categories",
    request_body = CategoryRequest,
    responses(
        (status = 201, description = "Created", body = Category),
        (status = 400, description = "Invalid name or slug already taken"),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not an admin")
    )
)]
pub async fn create_category(
    actor: Actor,
    State(state): State<AppState>,
    ValidJson(payload): ValidJson<CategoryRequest>,
) -> Result<(StatusCode, Json<Category>), ApiError> {
    POLICY.check(&actor, &Method::POST)?;
    validate_category_request(&payload)?;
    let category = state.repo.create_category(payload).await?;
    tracing::info!(slug = %category.slug, "category created");
    Ok((StatusCode::CREATED, Json(category)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/categories/{slug}",
    params(("slug" = String, Path, description = "Category slug")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_category(
    actor: Actor,
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<StatusCode, ApiError> {
    POLICY.check(&actor, &Method::DELETE)?;
    if state.repo.delete_category(&slug).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound)
    }
}

// --- Genres ---

#[utoipa::path(
    get,
    path = "/api/v1/genres",
    params(SearchFilter),
    responses((status = 200, description = "Genres", body = [Genre]))
)]
pub async fn list_genres(
    actor: Actor,
    State(state): State<AppState>,
    Query(filter): Query<SearchFilter>,
) -> Result<Json<Vec<Genre>>, ApiError> {
    POLICY.check(&actor, &Method::GET)?;
    Ok(Json(state.repo.list_genres(filter.search).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/genres",
    request_body = CategoryRequest,
    responses(
        (status = 201, description = "Created", body = Genre),
        (status = 400, description = "Invalid name or slug already taken"),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not an admin")
    )
)]
pub async fn create_genre(
    actor: Actor,
    State(state): State<AppState>,
    ValidJson(payload): ValidJson<CategoryRequest>,
) -> Result<(StatusCode, Json<Genre>), ApiError> {
    POLICY.check(&actor, &Method::POST)?;
    validate_category_request(&payload)?;
    let genre = state.repo.create_genre(payload).await?;
    tracing::info!(slug = %genre.slug, "genre created");
    Ok((StatusCode::CREATED, Json(genre)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/genres/{slug}",
    params(("slug" = String, Path, description = "Genre slug")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_genre(
    actor: Actor,
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<StatusCode, ApiError> {
    POLICY.check(&actor, &Method::DELETE)?;
    if state.repo.delete_genre(&slug).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound)
    }
}

// --- Titles ---

/// list_titles
///
/// [Public Route] Filters by category slug, genre slug, name substring and
/// exact year. Every title carries its current rating.
#[utoipa::path(
    get,
    path = "/api/v1/titles",
    params(TitleFilter),
    responses((status = 200, description = "Titles", body = [Title]))
)]
pub async fn list_titles(
    actor: Actor,
    State(state): State<AppState>,
    Query(filter): Query<TitleFilter>,
) -> Result<Json<Vec<Title>>, ApiError> {
    POLICY.check(&actor, &Method::GET)?;
    Ok(Json(state.repo.list_titles(&filter).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/titles/{title_id}",
    params(("title_id" = i64, Path, description = "Title id")),
    responses(
        (status = 200, description = "Title", body = Title),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_title(
    actor: Actor,
    State(state): State<AppState>,
    Path(title_id): Path<i64>,
) -> Result<Json<Title>, ApiError> {
    POLICY.check(&actor, &Method::GET)?;
    let title = state
        .repo
        .get_title(title_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(title))
}

/// create_title
///
/// [Admin Route] `category` and `genre` are slugs of existing objects. The
/// year may not be in the future.
#[utoipa::path(
    post,
    path = "/api/v1/titles",
    request_body = CreateTitleRequest,
    responses(
        (status = 201, description = "Created", body = Title),
        (status = 400, description = "Validation error"),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not an admin")
    )
)]
pub async fn create_title(
    actor: Actor,
    State(state): State<AppState>,
    ValidJson(payload): ValidJson<CreateTitleRequest>,
) -> Result<(StatusCode, Json<Title>), ApiError> {
    POLICY.check(&actor, &Method::POST)?;

    let mut errors = FieldErrors::new();
    validators::validate_name(&payload.name, &mut errors);
    validators::validate_year(payload.year, &mut errors);
    let (category_id, genre_ids) = resolve_refs(
        state.repo.as_ref(),
        payload.category.as_deref(),
        Some(payload.genre.as_slice()),
        &mut errors,
    )
    .await?;
    ApiError::check(errors)?;

    let title = state
        .repo
        .create_title(NewTitle {
            name: payload.name,
            year: payload.year,
            description: payload.description,
            category_id,
            genre_ids: genre_ids.unwrap_or_default(),
        })
        .await?;
    tracing::info!(title_id = title.id, "title created");
    Ok((StatusCode::CREATED, Json(title)))
}

#[utoipa::path(
    patch,
    path = "/api/v1/titles/{title_id}",
    params(("title_id" = i64, Path, description = "Title id")),
    request_body = UpdateTitleRequest,
    responses(
        (status = 200, description = "Updated", body = Title),
        (status = 400, description = "Validation error"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_title(
    actor: Actor,
    State(state): State<AppState>,
    Path(title_id): Path<i64>,
    ValidJson(payload): ValidJson<UpdateTitleRequest>,
) -> Result<Json<Title>, ApiError> {
    POLICY.check(&actor, &Method::PATCH)?;

    let mut errors = FieldErrors::new();
    if let Some(name) = &payload.name {
        validators::validate_name(name, &mut errors);
    }
    if let Some(year) = payload.year {
        validators::validate_year(year, &mut errors);
    }
    let (category_id, genre_ids) = resolve_refs(
        state.repo.as_ref(),
        payload.category.as_ref().and_then(|slug| slug.as_deref()),
        payload.genre.as_deref(),
        &mut errors,
    )
    .await?;
    ApiError::check(errors)?;

    // Absent keeps the category, `null` detaches it.
    let category_id = match payload.category {
        None => None,
        Some(None) => Some(None),
        Some(Some(_)) => category_id.map(Some),
    };

    let title = state
        .repo
        .update_title(
            title_id,
            TitleChanges {
                name: payload.name,
                year: payload.year,
                description: payload.description,
                category_id,
                genre_ids,
            },
        )
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(title))
}

/// delete_title
///
/// [Admin Route] Removes the title together with its reviews and their comments.
#[utoipa::path(
    delete,
    path = "/api/v1/titles/{title_id}",
    params(("title_id" = i64, Path, description = "Title id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_title(
    actor: Actor,
    State(state): State<AppState>,
    Path(title_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    POLICY.check(&actor, &Method::DELETE)?;
    if state.repo.delete_title(title_id).await? {
        tracing::info!(title_id, "title deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound)
    }
}
