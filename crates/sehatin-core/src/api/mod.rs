//! REST API client module for the Sehat-In backend.
//!
//! This module provides the `AuthApi` trait and its reqwest-backed
//! implementation `ApiClient` for the login, register, refresh and
//! token-exchange endpoints.
//!
//! Authenticated calls carry the relevant token as a bearer header.

pub mod client;
pub mod error;

pub use client::{ApiClient, AuthApi, DEFAULT_TIMEOUT_SECS};
pub use error::ApiError;
