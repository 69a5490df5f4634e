//! Input validation shared by the signup flow, the admin/user endpoints and
//! the catalog writes. Every check records a message against a field name;
//! callers collect them into [`FieldErrors`] and fail once with all of them.

use chrono::{Datelike, Utc};

use crate::error::FieldErrors;

/// The path segment `/users/me` is routed to self-service, so no account may
/// carry this name. The comparison is case-sensitive.
pub const RESERVED_USERNAME: &str = "me";

pub const USERNAME_MAX_LEN: usize = 150;
pub const EMAIL_MAX_LEN: usize = 254;
pub const NAME_MAX_LEN: usize = 256;
pub const SLUG_MAX_LEN: usize = 50;
pub const SCORE_MIN: i32 = 1;
pub const SCORE_MAX: i32 = 10;

fn push(errors: &mut FieldErrors, field: &str, message: impl Into<String>) {
    errors
        .entry(field.to_string())
        .or_default()
        .push(message.into());
}

/// Letters, digits and `_ . @ + -`, one or more.
fn is_username_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '.' | '@' | '+' | '-')
}

pub fn validate_username(username: &str, errors: &mut FieldErrors) {
    if username.is_empty() {
        push(errors, "username", "This field is required.");
        return;
    }
    if username == RESERVED_USERNAME {
        push(errors, "username", "The username 'me' is reserved.");
    }
    if username.chars().count() > USERNAME_MAX_LEN {
        push(
            errors,
            "username",
            format!("Ensure this field has no more than {USERNAME_MAX_LEN} characters."),
        );
    }
    if !username.chars().all(is_username_char) {
        push(
            errors,
            "username",
            "Enter a valid username. It may contain only letters, numbers and @/./+/-/_ characters.",
        );
    }
}

/// Structural email check: a single `@`, non-empty local part, and a dotted
/// domain with no empty labels. Deliverability is the mail collaborator's concern.
pub fn validate_email(email: &str, errors: &mut FieldErrors) {
    if email.is_empty() {
        push(errors, "email", "This field is required.");
        return;
    }
    if email.chars().count() > EMAIL_MAX_LEN {
        push(
            errors,
            "email",
            format!("Ensure this field has no more than {EMAIL_MAX_LEN} characters."),
        );
    }
    if !is_email(email) {
        push(errors, "email", "Enter a valid email address.");
    }
}

fn is_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2 && labels.iter().all(|label| !label.is_empty())
}

pub fn validate_slug(slug: &str, errors: &mut FieldErrors) {
    if slug.is_empty() {
        push(errors, "slug", "This field is required.");
        return;
    }
    if slug.len() > SLUG_MAX_LEN {
        push(
            errors,
            "slug",
            format!("Ensure this field has no more than {SLUG_MAX_LEN} characters."),
        );
    }
    if !slug
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        push(
            errors,
            "slug",
            "Enter a valid slug consisting of letters, numbers, underscores or hyphens.",
        );
    }
}

pub fn validate_name(name: &str, errors: &mut FieldErrors) {
    if name.trim().is_empty() {
        push(errors, "name", "This field may not be blank.");
    } else if name.chars().count() > NAME_MAX_LEN {
        push(
            errors,
            "name",
            format!("Ensure this field has no more than {NAME_MAX_LEN} characters."),
        );
    }
}

/// The release year may not be later than the current calendar year.
pub fn validate_year(year: i32, errors: &mut FieldErrors) {
    validate_year_against(year, Utc::now().year(), errors);
}

pub fn validate_year_against(year: i32, current_year: i32, errors: &mut FieldErrors) {
    if year > current_year {
        push(
            errors,
            "year",
            "The release year cannot be later than the current year.",
        );
    }
}

pub fn validate_score(score: i32, errors: &mut FieldErrors) {
    if !(SCORE_MIN..=SCORE_MAX).contains(&score) {
        push(
            errors,
            "score",
            format!("Score must be an integer between {SCORE_MIN} and {SCORE_MAX}."),
        );
    }
}

pub fn validate_text(text: &str, errors: &mut FieldErrors) {
    if text.trim().is_empty() {
        push(errors, "text", "This field may not be blank.");
    }
}

/// Optional profile fields (`first_name`, `last_name`) share the username limit.
pub fn validate_profile_field(field: &str, value: Option<&str>, errors: &mut FieldErrors) {
    if let Some(value) = value {
        if value.chars().count() > USERNAME_MAX_LEN {
            push(
                errors,
                field,
                format!("Ensure this field has no more than {USERNAME_MAX_LEN} characters."),
            );
        }
    }
}
