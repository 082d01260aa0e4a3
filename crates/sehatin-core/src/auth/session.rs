use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::models::UserData;

use super::error::AuthError;
use super::store::BlobStore;

/// Key the credential blob is stored under.
pub const BLOB_KEY: &str = "user";

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Nothing has been checked yet.
    Unresolved,
    /// A stored session was found and is being refreshed.
    Resolving,
    Authenticated,
    Unauthenticated,
}

impl SessionStatus {
    pub fn is_settled(&self) -> bool {
        matches!(self, SessionStatus::Authenticated | SessionStatus::Unauthenticated)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Unresolved => write!(f, "unresolved"),
            SessionStatus::Resolving => write!(f, "resolving"),
            SessionStatus::Authenticated => write!(f, "authenticated"),
            SessionStatus::Unauthenticated => write!(f, "unauthenticated"),
        }
    }
}

/// In-memory session. Identity and credentials only exist inside
/// `Authenticated`, so they can never be half populated.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Unresolved,
    Resolving,
    Authenticated {
        user: UserData,
        refreshed_at: DateTime<Utc>,
    },
    Unauthenticated,
}

impl SessionState {
    pub fn authenticated(user: UserData) -> Self {
        SessionState::Authenticated {
            user,
            refreshed_at: Utc::now(),
        }
    }

    pub fn status(&self) -> SessionStatus {
        match self {
            SessionState::Unresolved => SessionStatus::Unresolved,
            SessionState::Resolving => SessionStatus::Resolving,
            SessionState::Authenticated { .. } => SessionStatus::Authenticated,
            SessionState::Unauthenticated => SessionStatus::Unauthenticated,
        }
    }

    pub fn user(&self) -> Option<&UserData> {
        match self {
            SessionState::Authenticated { user, .. } => Some(user),
            _ => None,
        }
    }

    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        match self {
            SessionState::Authenticated { refreshed_at, .. } => Some(*refreshed_at),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        !self.status().is_settled()
    }

    pub fn is_authenticated(&self) -> bool {
        self.status() == SessionStatus::Authenticated
    }
}

/// The credential blob as kept in a `BlobStore`.
pub struct PersistedSession {
    store: Arc<dyn BlobStore>,
}

impl PersistedSession {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    /// Load the stored session, if any.
    pub fn load(&self) -> Result<Option<UserData>, AuthError> {
        let Some(contents) = self.store.get(BLOB_KEY)? else {
            return Ok(None);
        };
        let data: UserData = serde_json::from_str(&contents)?;
        Ok(Some(data))
    }

    /// Overwrite the stored session.
    pub fn save(&self, data: &UserData) -> Result<()> {
        let contents = serde_json::to_string(data).context("Failed to serialize session")?;
        self.store.set(BLOB_KEY, &contents)
    }

    pub fn clear(&self) -> Result<()> {
        self.store.remove(BLOB_KEY)
    }
}
