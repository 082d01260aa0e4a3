//! Authentication module for managing the user session.
//!
//! This module provides:
//! - `SessionManager`: restore, refresh, login, register, logout and token handoff
//! - `SessionState` / `SessionStatus`: the session lifecycle as an explicit enum
//! - `gate` / `Route`: one route guard shared by every page
//! - `BlobStore`: persistence for the credential blob (file, keychain, memory)

pub mod credentials;
pub mod error;
pub mod guard;
pub mod manager;
pub mod session;
pub mod store;

pub use credentials::KeyringStore;
pub use error::AuthError;
pub use guard::{gate, Access, GateDecision, Route};
pub use manager::{HandoffSource, Notice, NoticeLevel, SessionEvent, SessionManager};
pub use session::{PersistedSession, SessionState, SessionStatus, BLOB_KEY};
pub use store::{BlobStore, FileStore, MemoryStore};
