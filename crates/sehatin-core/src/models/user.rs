//! User identity and credential models.
//!
//! `UserData` is both the login/token-exchange response body and the
//! persisted credential blob, so its wire layout is fixed:
//! `id, username, email, accountType, profile{...}, accessToken, refreshToken`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Public profile attached to an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Profile {
    pub id: i64,
    #[serde(rename = "userId")]
    pub user_id: i64,
    #[serde(rename = "firstName", default)]
    pub first_name: String,
    #[serde(rename = "lastName", default)]
    pub last_name: String,
    #[serde(default)]
    pub picture: Option<String>,
}

impl Profile {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// Who the user is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Identity {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(rename = "accountType", default)]
    pub account_type: String,
    pub profile: Profile,
}

/// Access/refresh token pair. Also the body of a successful refresh.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct TokenPair {
    #[serde(rename = "accessToken")]
    pub access_token: String,
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// Identity and credentials, always carried together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct UserData {
    #[serde(flatten)]
    pub identity: Identity,
    #[serde(flatten)]
    pub tokens: TokenPair,
}

impl UserData {
    pub fn new(identity: Identity, tokens: TokenPair) -> Self {
        Self { identity, tokens }
    }

    /// Replace the tokens, keeping the identity.
    pub fn with_tokens(self, tokens: TokenPair) -> Self {
        Self {
            identity: self.identity,
            tokens,
        }
    }

    pub fn username(&self) -> &str {
        &self.identity.username
    }

    /// Profile name if set, otherwise the username.
    pub fn display_name(&self) -> String {
        let name = self.identity.profile.full_name();
        if name.is_empty() {
            self.identity.username.clone()
        } else {
            name
        }
    }
}

/// Body for the login and register endpoints.
#[derive(Clone, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

impl LoginRequest {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Body returned by the same-origin cookie handoff endpoint.
/// `user` holds the serialized `UserData`.
#[derive(Debug, Clone, Deserialize)]
pub struct CookieHandoff {
    pub user: String,
}
