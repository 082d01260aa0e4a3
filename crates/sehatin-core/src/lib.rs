//! Sehat-In session client.
//!
//! Owns the client side of authentication for the Sehat-In API: restoring a
//! saved session at startup, refreshing tokens, logging in and out,
//! completing third-party login handoffs, and deciding which routes a user
//! may see.
//!
//! ```no_run
//! # async fn run() -> anyhow::Result<()> {
//! use sehatin_core::{Config, SessionManager, SessionStatus};
//!
//! let config = Config::load()?;
//! let session = SessionManager::from_config(&config)?;
//! if session.restore().await == SessionStatus::Unauthenticated {
//!     println!("Please log in");
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{ApiClient, ApiError, AuthApi};
pub use auth::{
    gate, Access, AuthError, BlobStore, GateDecision, HandoffSource, Notice, NoticeLevel, Route,
    SessionEvent, SessionManager, SessionState, SessionStatus,
};
pub use config::{Config, StoreKind};
pub use models::{Identity, LoginRequest, Profile, TokenPair, UserData};
