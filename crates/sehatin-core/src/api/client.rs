//! API client for the Sehat-In authentication endpoints.
//!
//! `ApiClient` is the production implementation of [`AuthApi`], the seam the
//! session manager talks through.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{header, Client};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::models::{CookieHandoff, LoginRequest, TokenPair, UserData};

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

const LOGIN_PATH: &str = "/api/v1/auth/login";
const REGISTER_PATH: &str = "/api/v1/auth/register";
const REFRESH_PATH: &str = "/api/v1/auth/refresh";
const TOKEN_EXCHANGE_PATH: &str = "/api/v1/auth/get-data-from-token";
const GOOGLE_LOGIN_PATH: &str = "/api/v1/auth/login-google";
/// Called before the cookie handoff so the backend finishes its side of the
/// third-party login.
const HANDOFF_WARMUP_PATH: &str = "/api/v1/auth/dummy";

/// Default HTTP request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Authentication operations the session manager needs from the backend.
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Exchange username/password for identity and credentials.
    async fn login(&self, request: &LoginRequest) -> Result<UserData, ApiError>;

    /// Create an account. The response body is ignored.
    async fn register(&self, request: &LoginRequest) -> Result<(), ApiError>;

    /// Trade a refresh token for a new token pair.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, ApiError>;

    /// Trade a one-time handoff key for identity and credentials.
    async fn exchange_token(&self, key: &str) -> Result<UserData, ApiError>;

    /// Read (and consume) the handoff cookie via the same-origin endpoint,
    /// after touching the API's warm-up endpoint. Returns the raw serialized
    /// `UserData`.
    async fn fetch_cookie_handoff(&self) -> Result<String, ApiError>;

    /// Where a browser should go to start third-party (Google) login.
    fn google_login_url(&self) -> String;
}

/// HTTP client for the Sehat-In API.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    handoff_url: Option<String>,
}

impl ApiClient {
    /// Create a new API client rooted at `base_url`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            handoff_url: None,
        })
    }

    /// Set the same-origin endpoint that serves the handoff cookie.
    pub fn with_handoff_url(mut self, url: impl Into<String>) -> Self {
        self.handoff_url = Some(url.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn bearer(token: &str) -> Result<header::HeaderValue, ApiError> {
        header::HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| ApiError::InvalidResponse("Token contains invalid header characters".to_string()))
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    /// Read the body and decode it, reporting decode failures as invalid responses.
    async fn parse_json<T: DeserializeOwned>(response: reqwest::Response, what: &str) -> Result<T, ApiError> {
        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse {} response: {}", what, e)))
    }

    async fn get_with_bearer<T: DeserializeOwned>(&self, path: &str, token: &str, what: &str) -> Result<T, ApiError> {
        let url = self.url(path);
        debug!(url = %url, "GET");

        let response = self
            .client
            .get(&url)
            .header(header::AUTHORIZATION, Self::bearer(token)?)
            .send()
            .await?;

        let response = Self::check_response(response).await?;
        Self::parse_json(response, what).await
    }
}

#[async_trait]
impl AuthApi for ApiClient {
    async fn login(&self, request: &LoginRequest) -> Result<UserData, ApiError> {
        let url = self.url(LOGIN_PATH);
        debug!(url = %url, username = %request.username, "POST login");

        let response = self.client.post(&url).json(request).send().await?;
        let response = Self::check_response(response).await?;
        Self::parse_json(response, "login").await
    }

    async fn register(&self, request: &LoginRequest) -> Result<(), ApiError> {
        let url = self.url(REGISTER_PATH);
        debug!(url = %url, username = %request.username, "POST register");

        let response = self.client.post(&url).json(request).send().await?;
        Self::check_response(response).await?;
        Ok(())
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, ApiError> {
        self.get_with_bearer(REFRESH_PATH, refresh_token, "refresh").await
    }

    async fn exchange_token(&self, key: &str) -> Result<UserData, ApiError> {
        self.get_with_bearer(TOKEN_EXCHANGE_PATH, key, "token exchange").await
    }

    async fn fetch_cookie_handoff(&self) -> Result<String, ApiError> {
        let url = self
            .handoff_url
            .as_deref()
            .ok_or_else(|| ApiError::InvalidResponse("No handoff endpoint configured".to_string()))?;

        let warmup = self.url(HANDOFF_WARMUP_PATH);
        debug!(url = %warmup, "GET handoff warm-up");
        let response = self.client.get(&warmup).send().await?;
        Self::check_response(response).await?;

        debug!(url = %url, "GET cookie handoff");
        let response = self.client.get(url).send().await?;
        let response = Self::check_response(response).await?;
        let handoff: CookieHandoff = Self::parse_json(response, "cookie handoff").await?;
        Ok(handoff.user)
    }

    fn google_login_url(&self) -> String {
        self.url(GOOGLE_LOGIN_PATH)
    }
}
