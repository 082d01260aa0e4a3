//! Data models for Sehat-In accounts.
//!
//! - `UserData`: identity plus credentials, the persisted credential blob
//! - `Identity`, `Profile`: who the user is
//! - `TokenPair`: access and refresh tokens
//! - `LoginRequest`, `CookieHandoff`: request/response bodies

pub mod user;

pub use user::{CookieHandoff, Identity, LoginRequest, Profile, TokenPair, UserData};
