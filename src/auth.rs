use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::{AppConfig, Env},
    error::ApiError,
    models::User,
    repository::RepositoryState,
    roles::{Classification, Role, classify},
};

/// Claims
///
/// Payload of a session token. Signed with `AppConfig::jwt_secret` (HS256).
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user's id. Role and superuser status are *not* in the
    /// token; they are re-read from the store on every request.
    pub sub: Uuid,
    /// Expiration time (seconds since epoch).
    pub exp: usize,
    /// Issued at (seconds since epoch).
    pub iat: usize,
}

/// AuthUser
///
/// The authenticated account behind a request, snapshotted at request time.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub id: Uuid,
    pub username: String,
    pub role: Role,
    pub is_superuser: bool,
}

impl AuthUser {
    pub fn classification(&self) -> Classification {
        classify(self.role, self.is_superuser)
    }
}

impl From<User> for AuthUser {
    fn from(user: User) -> Self {
        AuthUser {
            id: user.id,
            username: user.username,
            role: user.role,
            is_superuser: user.is_superuser,
        }
    }
}

/// Actor
///
/// Whoever performs the request. Anonymous actors carry no role at all, so
/// their classification is always `Classification::Anonymous`.
#[derive(Debug, Clone, PartialEq)]
pub enum Actor {
    Anonymous,
    User(AuthUser),
}

impl Actor {
    pub fn classification(&self) -> Classification {
        match self {
            Actor::Anonymous => Classification::Anonymous,
            Actor::User(user) => user.classification(),
        }
    }

    pub fn user(&self) -> Option<&AuthUser> {
        match self {
            Actor::Anonymous => None,
            Actor::User(user) => Some(user),
        }
    }

    pub fn id(&self) -> Option<Uuid> {
        self.user().map(|user| user.id)
    }
}

/// issue_token
///
/// Mints a session token for `user`. The confirmation-code exchange is the
/// only caller.
pub fn issue_token(user: &User, config: &AppConfig) -> Result<String, ApiError> {
    let now = Utc::now().timestamp().max(0) as usize;
    let claims = Claims {
        sub: user.id,
        iat: now,
        exp: now + config.access_token_ttl_secs.max(0) as usize,
    };
    let key = EncodingKey::from_secret(config.jwt_secret.as_bytes());
    encode(&Header::default(), &claims, &key)
        .map_err(|e| ApiError::Internal(format!("failed to sign session token: {e}")))
}

/// resolve_actor
///
/// Shared by both extractors:
/// 1. Local bypass: in `Env::Local` only, an `x-user-id` header naming an
///    existing user authenticates as that user.
/// 2. No `Authorization` header: anonymous.
/// 3. Otherwise the header must be `Bearer <jwt>` with a valid, unexpired token
///    whose subject still exists; anything else is `NotAuthenticated`.
async fn resolve_actor(
    parts: &Parts,
    repo: &RepositoryState,
    config: &AppConfig,
) -> Result<Actor, ApiError> {
    if config.env == Env::Local {
        if let Some(user_id) = parts
            .headers
            .get("x-user-id")
            .and_then(|value| value.to_str().ok())
            .and_then(|id_str| Uuid::parse_str(id_str).ok())
        {
            if let Some(user) = repo.get_user(user_id).await? {
                return Ok(Actor::User(user.into()));
            }
        }
    }

    let Some(auth_header) = parts.headers.get(header::AUTHORIZATION) else {
        return Ok(Actor::Anonymous);
    };

    let token = auth_header
        .to_str()
        .ok()
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(ApiError::NotAuthenticated)?;

    let decoding_key = DecodingKey::from_secret(config.jwt_secret.as_bytes());
    let mut validation = Validation::default();
    validation.validate_exp = true;

    let token_data = decode::<Claims>(token, &decoding_key, &validation).map_err(|e| {
        tracing::warn!("rejected session token: {:?}", e.kind());
        ApiError::NotAuthenticated
    })?;

    // A deleted account invalidates its outstanding tokens.
    let user = repo
        .get_user(token_data.claims.sub)
        .await?
        .ok_or(ApiError::NotAuthenticated)?;

    Ok(Actor::User(user.into()))
}

/// Actor extractor: never rejects a request for lacking credentials, only for
/// presenting bad ones.
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);
        resolve_actor(parts, &repo, &config).await
    }
}

/// AuthUser extractor: rejects anonymous requests with 401.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Actor::from_request_parts(parts, state).await? {
            Actor::User(user) => Ok(user),
            Actor::Anonymous => Err(ApiError::NotAuthenticated),
        }
    }
}
