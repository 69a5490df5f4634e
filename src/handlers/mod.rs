//! HTTP handlers, grouped by resource.
//!
//! Every handler takes the [`Actor`](crate::auth::Actor) and runs the
//! endpoint's [`Policy`](crate::permissions::Policy) before touching storage.
//! Nested resources are resolved parent-first so a missing parent is a 404
//! before any instance-level check runs.

pub mod auth;
pub mod catalog;
pub mod reviews;
pub mod users;
