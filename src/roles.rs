use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;
use utoipa::ToSchema;

/// Role
///
/// The stored role of a user account (`users.role`). The ordering follows the
/// hierarchy `user < moderator < admin`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
    TS, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Role {
    #[default]
    User,
    Moderator,
    Admin,
}

impl Role {
    /// The database / wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Moderator => "moderator",
            Role::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown role '{0}'")]
pub struct RoleParseError(pub String);

impl std::str::FromStr for Role {
    type Err = RoleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "moderator" => Ok(Role::Moderator),
            "admin" => Ok(Role::Admin),
            other => Err(RoleParseError(other.to_string())),
        }
    }
}

/// Lets `sqlx::FromRow` decode the `role` column straight into the enum.
impl TryFrom<String> for Role {
    type Error = RoleParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Classification
///
/// The effective authority level of an actor at request time, with the
/// superuser override already folded in. Ordered from least to most privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Classification {
    Anonymous,
    User,
    Moderator,
    Admin,
}

impl Classification {
    /// Admin-level capability: `role == admin OR is_superuser`.
    pub fn is_admin(self) -> bool {
        self == Classification::Admin
    }

    /// Moderator-or-above capability: `role in {moderator, admin} OR is_superuser`.
    pub fn is_moderator_or_above(self) -> bool {
        self >= Classification::Moderator
    }

    pub fn is_authenticated(self) -> bool {
        self != Classification::Anonymous
    }
}

/// classify
///
/// Resolves the classification of an authenticated account. `is_superuser`
/// always wins over the stored role. Anonymous actors never reach this
/// function; see [`crate::auth::Actor::classification`].
pub fn classify(role: Role, is_superuser: bool) -> Classification {
    if is_superuser {
        return Classification::Admin;
    }
    match role {
        Role::User => Classification::User,
        Role::Moderator => Classification::Moderator,
        Role::Admin => Classification::Admin,
    }
}
