use axum::{
    Json,
    extract::{FromRequest, Request, rejection::JsonRejection},
};
use serde::de::DeserializeOwned;

use crate::error::{ApiError, NON_FIELD_ERRORS};

const DATA_ERROR_PREFIX: &str = "Failed to deserialize the JSON body into the target type: ";

/// ValidJson
///
/// `Json<T>` whose rejections are `ApiError::Validation`, so a missing or
/// mistyped field comes back as a 400 keyed by that field like every other
/// input error.
#[derive(Debug, Clone)]
pub struct ValidJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ValidJson(value)),
            Err(rejection) => {
                tracing::debug!("rejected request body: {}", rejection.body_text());
                Err(rejection_to_validation(&rejection))
            }
        }
    }
}

fn rejection_to_validation(rejection: &JsonRejection) -> ApiError {
    match rejection {
        JsonRejection::JsonDataError(_) => {
            let text = rejection.body_text();
            let detail = text.strip_prefix(DATA_ERROR_PREFIX).unwrap_or(&text);
            let (field, message) = attribute_data_error(detail);
            ApiError::field(&field, message)
        }
        JsonRejection::JsonSyntaxError(_) => {
            ApiError::field(NON_FIELD_ERRORS, "Malformed JSON body.")
        }
        JsonRejection::MissingJsonContentType(_) => ApiError::field(
            NON_FIELD_ERRORS,
            "Expected request with `Content-Type: application/json`.",
        ),
        _ => ApiError::field(NON_FIELD_ERRORS, "Unreadable request body."),
    }
}

/// Splits a deserializer message into the offending top-level field and a
/// caller-facing message.
///
/// Shapes seen here:
/// - `missing field `score` at line 1 column 15`
/// - `score: invalid type: string "7", expected i32 at line 1 column 22`
/// - `genre[0]: invalid type: integer `3`, expected a string at line 1 column 40`
pub fn attribute_data_error(detail: &str) -> (String, String) {
    let detail = strip_position(detail);

    if let Some(rest) = detail.strip_prefix("missing field `") {
        if let Some((name, _)) = rest.split_once('`') {
            return (name.to_string(), "This field is required.".to_string());
        }
    }

    if let Some((path, message)) = detail.split_once(": ") {
        if !path.is_empty() && !path.contains(char::is_whitespace) {
            let field = path
                .split(['.', '['])
                .next()
                .filter(|name| !name.is_empty())
                .unwrap_or(NON_FIELD_ERRORS);
            return (field.to_string(), capitalize(message));
        }
    }

    (NON_FIELD_ERRORS.to_string(), capitalize(detail))
}

fn strip_position(detail: &str) -> &str {
    match detail.rfind(" at line ") {
        Some(idx) => &detail[..idx],
        None => detail,
    }
}

fn capitalize(message: &str) -> String {
    let mut chars = message.chars();
    match chars.next() {
        Some(first) => format!("{}{}.", first.to_uppercase(), chars.as_str()),
        None => String::new(),
    }
}

