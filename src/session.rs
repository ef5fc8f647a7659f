use sqlx::SqlitePool;

use crate::purchases::model::REFERENCE_NOT_FOUND;
use crate::{AppError, AppResult};

/// The staff member performing an operation. Passed explicitly to every
/// write that needs to stamp an author.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    user_id: String,
}

impl Session {
    pub fn new(user_id: impl Into<String>) -> Self {
        Session {
            user_id: user_id.into(),
        }
    }

    /// Build a session for the user registered under `username`.
    pub async fn for_username(pool: &SqlitePool, username: &str) -> AppResult<Self> {
        let user_id: Option<String> = sqlx::query_scalar("SELECT id FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(pool)
            .await
            .map_err(|err| AppError::from(err).with_context("operation", "session_lookup"))?;

        user_id.map(Session::new).ok_or_else(|| {
            AppError::new(REFERENCE_NOT_FOUND, "No user is registered under that username")
                .with_context("entity", "user")
                .with_context("username", username.to_string())
        })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}
