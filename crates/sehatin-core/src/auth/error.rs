use thiserror::Error;

use crate::api::ApiError;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Stored session is malformed: {0}")]
    MalformedBlob(#[from] serde_json::Error),

    #[error("Not logged in")]
    NotAuthenticated,

    #[error("Invalid handoff callback: {0}")]
    InvalidHandoff(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl AuthError {
    /// Short message suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            AuthError::Api(e) => e.user_message(),
            AuthError::MalformedBlob(_) => "Login data was unreadable. Please log in again.".to_string(),
            AuthError::NotAuthenticated => "Please log in first.".to_string(),
            AuthError::InvalidHandoff(_) => "Login link is invalid or expired. Please log in again.".to_string(),
            AuthError::Storage(e) => format!("Could not access saved login: {}", e),
        }
    }
}
