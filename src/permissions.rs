//! Authorization Engine.
//!
//! Every endpoint is guarded by one [`Policy`]. Handlers run the
//! collection-level check (`can_access`) before touching storage and, for
//! reviews and comments, the instance-level check (`can_access_object`) after
//! resolving the target and before persisting. Resource existence is decided
//! by the handler; this module only answers allow/deny.
//!
//! All role logic is delegated to [`Classification`]; nothing here compares
//! role strings or superuser flags directly.

use axum::http::Method;
use uuid::Uuid;

use crate::{
    auth::Actor,
    error::ApiError,
    models::{Comment, Review},
};

/// GET, HEAD and OPTIONS never mutate state.
pub fn is_safe_method(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

/// Resource
///
/// An object subject to instance-level checks. Whether moderators may write to
/// it is a property of the variant, not of any runtime type inspection.
#[derive(Debug, Clone, Copy)]
pub enum Resource<'a> {
    Review(&'a Review),
    Comment(&'a Comment),
}

impl Resource<'_> {
    pub fn author_id(&self) -> Uuid {
        match self {
            Resource::Review(review) => review.author_id,
            Resource::Comment(comment) => comment.author_id,
        }
    }

    /// Moderators (and above) may edit or delete moderatable resources they
    /// did not author.
    pub fn is_moderatable(&self) -> bool {
        match self {
            Resource::Review(_) | Resource::Comment(_) => true,
        }
    }
}

/// Policy
///
/// The access rules used by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Reviews and comments: anyone reads, authenticated users create, and
    /// authors, moderators and admins modify.
    ReviewComment,
    /// Categories, genres and titles: anyone reads, only admins write.
    ReadOnlyOrAdmin,
    /// User administration: admins only, for every method. No ownership exception.
    AdminOnly,
    /// Self-service (`/users/me`): any authenticated user.
    Authenticated,
}

impl Policy {
    /// Collection-level decision.
    pub fn can_access(self, actor: &Actor, method: &Method) -> bool {
        let class = actor.classification();
        match self {
            Policy::ReviewComment => is_safe_method(method) || class.is_authenticated(),
            Policy::ReadOnlyOrAdmin => is_safe_method(method) || class.is_admin(),
            Policy::AdminOnly => class.is_admin(),
            Policy::Authenticated => class.is_authenticated(),
        }
    }

    /// Instance-level decision.
    ///
    /// For `ReviewComment` writes the result is the plain disjunction
    /// `admin OR (moderator-or-above AND moderatable) OR author`; every term is
    /// evaluated. The other policies have no per-object rule and defer to
    /// `can_access`.
    pub fn can_access_object(self, actor: &Actor, method: &Method, resource: Resource<'_>) -> bool {
        match self {
            Policy::ReviewComment => {
                if is_safe_method(method) {
                    return true;
                }
                let class = actor.classification();
                let is_author = actor.id() == Some(resource.author_id());
                class.is_admin()
                    | (class.is_moderator_or_above() & resource.is_moderatable())
                    | is_author
            }
            other => other.can_access(actor, method),
        }
    }

    /// `can_access` as a `Result`, with the denial mapped for the caller.
    pub fn check(self, actor: &Actor, method: &Method) -> Result<(), ApiError> {
        if self.can_access(actor, method) {
            Ok(())
        } else {
            Err(self.deny(actor, method))
        }
    }

    pub fn check_object(
        self,
        actor: &Actor,
        method: &Method,
        resource: Resource<'_>,
    ) -> Result<(), ApiError> {
        if self.can_access_object(actor, method, resource) {
            Ok(())
        } else {
            Err(self.deny(actor, method))
        }
    }

    /// Anonymous callers are asked to authenticate (401); authenticated callers
    /// are refused (403).
    fn deny(self, actor: &Actor, method: &Method) -> ApiError {
        match actor {
            Actor::Anonymous => ApiError::NotAuthenticated,
            Actor::User(user) => {
                tracing::warn!(
                    user = %user.username,
                    policy = ?self,
                    %method,
                    "permission denied"
                );
                ApiError::PermissionDenied
            }
        }
    }
}
