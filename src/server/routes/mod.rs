mod auth;
mod categories;
mod questions;
mod users;

pub use auth::auth_router;
pub use categories::category_router;
pub use questions::questions_router;
pub use users::users_router;

use serde::Serialize;

use super::error::ApiError;

pub type ApiResponse<T> = Result<T, ApiError>;

#[derive(Debug, Serialize)]
pub struct Message {
    pub message: String,
}

impl Message {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Trimmed value of a required text field; missing or blank is a validation error.
fn required(value: Option<String>, message: &str) -> ApiResponse<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::validation(message))
}

/// Trimmed optional text; blank counts as absent.
fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}
