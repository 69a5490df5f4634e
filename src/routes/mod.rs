/// Router Module Index
///
/// One router per resource family. Access control is not applied as a layer:
/// each handler evaluates its own `Policy`, because reads and writes on the
/// same path are governed differently (see `permissions`).

/// Signup and token exchange. Public.
pub mod auth;

/// Categories, genres and titles. Read by anyone, written by admins.
pub mod catalog;

/// Reviews and comments nested under titles.
pub mod reviews;

/// User administration and `/users/me`.
pub mod users;
